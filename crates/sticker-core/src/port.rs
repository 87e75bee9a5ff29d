use crate::protocol::{Envelope, FromWorker, ToWorker};
use crossbeam_channel::{unbounded, Receiver, RecvError, RecvTimeoutError, SendError, Sender, TryRecvError};
use std::time::Duration;

/// One end of an ordered, asynchronous, bidirectional channel.
pub struct Port<Out, In> {
    tx: Sender<Out>,
    rx: Receiver<In>,
}

/// Main-thread end of a worker channel.
pub type MainPort = Port<Envelope<ToWorker>, Envelope<FromWorker>>;

/// Worker-thread end of a worker channel.
pub type WorkerPort = Port<Envelope<FromWorker>, Envelope<ToWorker>>;

/// Creates a connected pair of ports.
pub fn channel() -> (MainPort, WorkerPort) {
    let (to_worker_tx, to_worker_rx) = unbounded();
    let (to_main_tx, to_main_rx) = unbounded();
    (
        Port {
            tx: to_worker_tx,
            rx: to_main_rx,
        },
        Port {
            tx: to_main_tx,
            rx: to_worker_rx,
        },
    )
}

impl<Out, In> Port<Out, In> {
    pub fn post(&self, message: Out) -> Result<(), SendError<Out>> {
        self.tx.send(message)
    }

    pub fn try_recv(&self) -> Result<In, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn recv(&self) -> Result<In, RecvError> {
        self.rx.recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<In, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Messages waiting to be received.
    pub fn backlog(&self) -> usize {
        self.rx.len()
    }
}
