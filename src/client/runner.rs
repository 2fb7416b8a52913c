//! Task that owns the engine and serializes everything that touches it

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::{
    client::{engine::DiscoveryEngine, profile::ProfileDbSnapshot},
    core::{
        error::{ClientError, ClientResult},
        types::ProfileId,
    },
    stack::{GattStack, StackEvent},
};

const COMMAND_QUEUE_DEPTH: usize = 16;

/// Request sent from a [`ClientHandle`] to the runner
#[derive(Debug)]
pub enum ClientCommand {
    SetTargetName {
        name: String,
        reply: oneshot::Sender<ClientResult<()>>,
    },
    Start {
        reply: oneshot::Sender<ClientResult<()>>,
    },
    Read {
        profile: ProfileId,
        index: usize,
        reply: oneshot::Sender<ClientResult<()>>,
    },
    Write {
        profile: ProfileId,
        index: usize,
        value: Vec<u8>,
        reply: oneshot::Sender<ClientResult<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<ProfileDbSnapshot>,
    },
}

/// Cloneable async front of a running engine
#[derive(Debug, Clone)]
pub struct ClientHandle {
    tx: mpsc::Sender<ClientCommand>,
}

impl ClientHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ClientCommand,
    ) -> ClientResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| ClientError::EngineStopped)?;
        rx.await.map_err(|_| ClientError::EngineStopped)
    }

    pub async fn set_target_name(&self, name: impl Into<String>) -> ClientResult<()> {
        let name = name.into();
        self.request(|reply| ClientCommand::SetTargetName { name, reply })
            .await?
    }

    pub async fn start(&self) -> ClientResult<()> {
        self.request(|reply| ClientCommand::Start { reply }).await?
    }

    pub async fn read(&self, profile: ProfileId, index: usize) -> ClientResult<()> {
        self.request(|reply| ClientCommand::Read {
            profile,
            index,
            reply,
        })
        .await?
    }

    pub async fn write(&self, profile: ProfileId, index: usize, value: Vec<u8>) -> ClientResult<()> {
        self.request(|reply| ClientCommand::Write {
            profile,
            index,
            value,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> ClientResult<ProfileDbSnapshot> {
        self.request(|reply| ClientCommand::Snapshot { reply }).await
    }
}

/// Drives a [`DiscoveryEngine`] from stack events and handle commands
pub struct ClientRunner<S: GattStack> {
    engine: DiscoveryEngine<S>,
    events: mpsc::UnboundedReceiver<StackEvent>,
    commands: mpsc::Receiver<ClientCommand>,
}

impl<S: GattStack> ClientRunner<S> {
    pub fn new(
        engine: DiscoveryEngine<S>,
        events: mpsc::UnboundedReceiver<StackEvent>,
    ) -> (Self, ClientHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let runner = Self {
            engine,
            events,
            commands,
        };
        (runner, ClientHandle { tx })
    }

    /// Run until both the stack and every handle are gone
    pub async fn run(mut self) -> DiscoveryEngine<S> {
        info!("GATT client runner started");
        loop {
            tokio::select! {
                // stack events already queued are applied before new commands
                biased;
                Some(event) = self.events.recv() => self.engine.handle_event(event),
                Some(command) = self.commands.recv() => self.handle_command(command),
                else => break,
            }
        }
        info!("GATT client runner stopped");
        self.engine
    }

    fn handle_command(&mut self, command: ClientCommand) {
        // a dropped reply receiver only means the caller stopped waiting
        match command {
            ClientCommand::SetTargetName { name, reply } => {
                let _ = reply.send(self.engine.set_target_name(&name));
            }
            ClientCommand::Start { reply } => {
                let _ = reply.send(self.engine.start());
            }
            ClientCommand::Read {
                profile,
                index,
                reply,
            } => {
                let _ = reply.send(self.engine.read(profile, index));
            }
            ClientCommand::Write {
                profile,
                index,
                value,
                reply,
            } => {
                let _ = reply.send(self.engine.write(profile, index, &value));
            }
            ClientCommand::Snapshot { reply } => {
                debug!("Snapshot requested");
                let _ = reply.send(self.engine.snapshot());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        client::engine::test_support::*,
        core::types::{GattStatus, SlotState},
        stack::{GapEvent, GattcEvent, MockStack, StackCall},
    };

    #[tokio::test]
    async fn test_commands_and_events_share_one_engine() {
        let stack = MockStack::new();
        let (engine, _) = engine(&stack);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (runner, handle) = ClientRunner::new(engine, events_rx);
        let task = tokio::spawn(runner.run());

        handle.set_target_name("peer").await.unwrap();
        handle.start().await.unwrap();
        assert_eq!(handle.start().await, Err(ClientError::AlreadyStarted));

        events_tx
            .send(gattc(GattcEvent::Registered {
                status: GattStatus::OK,
                app_id: 0,
            }))
            .unwrap();
        events_tx
            .send(StackEvent::Gap(GapEvent::ScanParamsSet {
                status: GattStatus::OK,
            }))
            .unwrap();
        events_tx.send(adv("peer")).unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.profiles[0].state, SlotState::Connecting);
        assert_eq!(stack.count(|c| matches!(c, StackCall::Open { .. })), 1);

        assert!(matches!(
            handle.read(0, 0).await,
            Err(ClientError::NotReady { .. })
        ));

        drop(handle);
        drop(events_tx);
        let engine = task.await.unwrap();
        assert!(engine.is_started());
    }

    #[tokio::test]
    async fn test_invalid_name_reported_to_caller() {
        let stack = MockStack::new();
        let (engine, _) = engine(&stack);
        let (_events_tx, events_rx) = mpsc::unbounded_channel();
        let (runner, handle) = ClientRunner::new(engine, events_rx);
        tokio::spawn(runner.run());

        let err = handle.set_target_name("").await.unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_stopped_runner_reports_engine_stopped() {
        let stack = MockStack::new();
        let (engine, _) = engine(&stack);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (runner, handle) = ClientRunner::new(engine, events_rx);
        drop(events_tx);
        drop(runner);

        assert_eq!(handle.start().await, Err(ClientError::EngineStopped));
    }
}
