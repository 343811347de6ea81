//! Task startup and wiring
//!
//! Builds one [`Core`] worth of engine state, wires the queues between
//! the tasks and spawns them on named OS threads:
//!
//! | thread             | role                        | cadence          |
//! |--------------------|-----------------------------|------------------|
//! | `spindeck-audio`   | [`AudioTask`]               | paced by the sink |
//! | `spindeck-io`      | [`IoTask`]                  | fixed period     |
//! | `spindeck-stream`  | [`StreamTask`]              | work-driven      |
//! | `spindeck-gc`      | [`Reclaimer`]               | fixed period     |
//!
//! The audio and stream tasks reference each other; the cycle is broken
//! by wiring after construction: the audio task gets a [`CommandSink`]
//! front for the stream command queue, the stream task gets the ring
//! producers and the deck-event queue. Thread priorities and CPU pinning
//! are host policy (the reference firmware pins audio to its own core);
//! this layer only names the threads so hosts can apply either.
//!
//! Startup is all-or-nothing: if any thread fails to spawn the already
//! running ones are shut down before the error is returned.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;

use crate::config::CoreConfig;
use crate::engine::{self, AudioTask, CommandSink, Deck, DeckAtomics};
use crate::gc::Reclaimer;
use crate::hal::{AudioSink, BlockStorage, InputSnapshot, InputSource, MotorSink};
use crate::io::IoTask;
use crate::ring::sector_ring;
use crate::stream::{self, StreamCommand, StreamTask};
use crate::types::NUM_DECKS;
use crate::ui::{details_cell, DeckView};

/// Unrecoverable startup failures
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("failed to spawn the {task} task: {source}")]
    Spawn {
        task: &'static str,
        source: std::io::Error,
    },
}

/// [`CommandSink`] front for the stream command queue
struct StreamCommandSink {
    commands: flume::Sender<StreamCommand>,
}

impl StreamCommandSink {
    fn send(&self, command: StreamCommand) {
        // Non-blocking from the audio thread; variant requests are rare
        // user actions, dropping one under pathological load is fine.
        if self.commands.try_send(command).is_err() {
            log::warn!("stream command queue full, dropping variant request");
        }
    }
}

impl CommandSink for StreamCommandSink {
    fn prev_variant(&mut self, deck: usize) {
        self.send(StreamCommand::PrevVariant { deck });
    }

    fn next_variant(&mut self, deck: usize) {
        self.send(StreamCommand::NextVariant { deck });
    }
}

/// Handles to a running core
pub struct CoreHandles {
    commands: flume::Sender<StreamCommand>,
    /// Per-deck read-only views for the UI
    pub deck_views: [DeckView; NUM_DECKS],
    /// Input snapshots mirrored to the UI at the poll rate
    pub ui_inputs: rtrb::Consumer<InputSnapshot>,

    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl CoreHandles {
    /// Queue a track open on a deck
    pub fn open_track(&self, deck: usize, path: impl Into<PathBuf>) {
        let _ = self.commands.send(StreamCommand::Open {
            deck,
            path: path.into(),
        });
    }

    /// Queue a track close on a deck
    pub fn close_track(&self, deck: usize) {
        let _ = self.commands.send(StreamCommand::Close { deck });
    }

    /// Direct access to the stream command queue
    pub fn commands(&self) -> &flume::Sender<StreamCommand> {
        &self.commands
    }

    /// Stop all tasks and wait for them to exit
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for thread in self.threads {
            let _ = thread.join();
        }
        log::info!("core stopped");
    }
}

/// The assembled core, ready to start
pub struct Core {
    config: CoreConfig,
}

impl Core {
    pub fn new(config: CoreConfig) -> Self {
        Self { config }
    }

    /// Wire up the engine and spawn all tasks
    pub fn start(
        self,
        sink: Box<dyn AudioSink>,
        input: Box<dyn InputSource>,
        motors: Box<dyn MotorSink>,
        storage: Box<dyn BlockStorage>,
    ) -> Result<CoreHandles, StartupError> {
        let config = self.config;
        let shutdown = Arc::new(AtomicBool::new(false));

        let (input_tx, input_rx) = engine::input_channel();
        let (ui_tx, ui_rx) = engine::input_channel();
        let (event_tx, event_rx) = engine::event_channel();
        let (command_tx, command_rx) = stream::command_channel();

        let reclaimer = Reclaimer::new();
        let gc = reclaimer.handle();

        let atomics: [Arc<DeckAtomics>; NUM_DECKS] =
            std::array::from_fn(|_| Arc::new(DeckAtomics::new()));
        let details = [details_cell(&gc), details_cell(&gc)];

        let (ring0_tx, ring0_rx) = sector_ring(config.ring_sectors);
        let (ring1_tx, ring1_rx) = sector_ring(config.ring_sectors);

        let decks = [
            Deck::new(0, ring0_rx, Arc::clone(&atomics[0]), &config),
            Deck::new(1, ring1_rx, Arc::clone(&atomics[1]), &config),
        ];

        let mut audio = AudioTask::new(
            decks,
            input_rx,
            event_rx,
            Box::new(StreamCommandSink {
                commands: command_tx.clone(),
            }),
            sink,
        );

        let mut stream = StreamTask::new(
            storage,
            command_rx,
            [ring0_tx, ring1_tx],
            std::array::from_fn(|i| Arc::clone(&atomics[i])),
            event_tx,
            [Arc::clone(&details[0]), Arc::clone(&details[1])],
            gc,
        );

        let mut io = IoTask::new(
            input,
            motors,
            input_tx,
            ui_tx,
            std::array::from_fn(|i| Arc::clone(&atomics[i])),
            &config,
        );

        let deck_views: [DeckView; NUM_DECKS] = std::array::from_fn(|i| {
            DeckView::new(Arc::clone(&atomics[i]), Arc::clone(&details[i]))
        });

        let mut threads = Vec::new();

        let result = (|| -> Result<(), StartupError> {
            let flag = Arc::clone(&shutdown);
            threads.push(spawn_task("audio", move || audio.run(&flag))?);

            let flag = Arc::clone(&shutdown);
            threads.push(spawn_task("io", move || io.run(&flag))?);

            let flag = Arc::clone(&shutdown);
            threads.push(spawn_task("stream", move || stream.run(&flag))?);

            let flag = Arc::clone(&shutdown);
            threads.push(spawn_task("gc", move || reclaimer.run(&flag))?);

            Ok(())
        })();

        if let Err(error) = result {
            // No partial operation: stop whatever already started.
            shutdown.store(true, Ordering::Relaxed);
            for thread in threads {
                let _ = thread.join();
            }
            return Err(error);
        }

        log::info!("core started");

        Ok(CoreHandles {
            commands: command_tx,
            deck_views,
            ui_inputs: ui_rx,
            shutdown,
            threads,
        })
    }
}

fn spawn_task(
    name: &'static str,
    body: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>, StartupError> {
    std::thread::Builder::new()
        .name(format!("spindeck-{name}"))
        .spawn(body)
        .map_err(|source| StartupError::Spawn { task: name, source })
}
