use crate::config::EngineConfig;
use crate::connector::Connector;
use crate::errors::{ConnectorError, PlayerError};
use crate::port::{self, MainPort};
use crate::protocol::{WorkerUpdate, MEDIA_CHANNEL};
use crate::rasterizer::RasterizerFactory;
use crate::scheduler::Scheduler;
use crate::worker::{self, WorkerOptions};
use crate::SourceLoader;
use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Worker assigned to one animation for its whole life.
#[derive(Clone)]
pub struct WorkerHandle {
    pub index: usize,
    pub connector: Connector,
}

/// Fixed set of workers, each behind one connector on the `media` channel.
pub struct WorkerPool {
    connectors: Vec<Connector>,
    threads: RefCell<Vec<JoinHandle<()>>>,
    next: Cell<usize>,
}

impl WorkerPool {
    /// Spawns `config.worker_count()` worker threads.
    pub fn spawn(
        config: &EngineConfig,
        loader: Arc<dyn SourceLoader>,
        rasterizers: Arc<dyn RasterizerFactory>,
        scheduler: Scheduler,
    ) -> Result<Self, PlayerError> {
        let count = config.worker_count();
        let options = WorkerOptions::from(config);
        let mut ports = Vec::with_capacity(count);
        let mut threads = Vec::with_capacity(count);
        for index in 0..count {
            let (main, worker_end) = port::channel();
            let thread = worker::spawn(index, worker_end, loader.clone(), rasterizers.clone(), options)
                .map_err(PlayerError::WorkerSpawn)?;
            ports.push(main);
            threads.push(thread);
        }
        info!(workers = count, "Worker pool started");
        let pool = Self::from_ports(ports, scheduler);
        *pool.threads.borrow_mut() = threads;
        Ok(pool)
    }

    /// Wraps host-provided worker ports.
    pub fn from_ports(ports: Vec<MainPort>, scheduler: Scheduler) -> Self {
        let connectors = ports
            .into_iter()
            .enumerate()
            .map(|(index, port)| {
                let connector = Connector::new(port, MEDIA_CHANNEL, scheduler.clone());
                connector.on_update(move |update| match update {
                    WorkerUpdate::Ready { index: reported } => {
                        debug!(worker = index, reported, "worker ready")
                    }
                });
                connector
            })
            .collect();
        Self {
            connectors,
            threads: RefCell::new(Vec::new()),
            next: Cell::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Round-robin worker for a new animation.
    pub fn acquire_for_new_instance(&self) -> Result<WorkerHandle, PlayerError> {
        if self.connectors.is_empty() {
            return Err(PlayerError::NoWorkers);
        }
        let index = self.next.get() % self.connectors.len();
        self.next.set(index + 1);
        Ok(WorkerHandle {
            index,
            connector: self.connectors[index].clone(),
        })
    }

    pub fn connector(&self, index: usize) -> Option<&Connector> {
        self.connectors.get(index)
    }

    /// Pumps every connector. The first fault is returned after all were pumped.
    pub fn poll(&self) -> Result<usize, ConnectorError> {
        let mut handled = 0;
        let mut first_error = None;
        for connector in &self.connectors {
            match connector.poll() {
                Ok(count) => handled += count,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(handled),
        }
    }

    /// Posts queued payloads without waiting for tick end.
    pub fn flush_all(&self) -> Result<usize, ConnectorError> {
        let mut posted = 0;
        for connector in &self.connectors {
            posted += connector.flush()?;
        }
        Ok(posted)
    }

    pub fn pending_requests(&self) -> usize {
        self.connectors.iter().map(Connector::pending_requests).sum()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for connector in &self.connectors {
            connector.close();
        }
        for thread in self.threads.get_mut().drain(..) {
            if thread.join().is_err() {
                warn!("Worker thread panicked during shutdown");
            }
        }
    }
}
