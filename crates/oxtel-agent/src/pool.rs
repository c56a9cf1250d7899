use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Fixed-size worker pool with a bounded FIFO queue.
///
/// The queue capacity equals the worker count, so `submit` exerts
/// backpressure: it suspends when every worker is busy and the queue is
/// full rather than dropping or buffering without bound. `stop` closes the
/// queue; workers finish the task at hand, drain what is already queued and
/// return.
pub struct WorkerPool {
    workers: usize,
    queue: Option<mpsc::Sender<Task>>,
    receiver: Option<mpsc::Receiver<Task>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// A misconfigured `rate_limit` of zero is treated as one worker.
    pub fn new(rate_limit: usize) -> Self {
        let workers = rate_limit.max(1);
        let (queue, receiver) = mpsc::channel(workers);
        Self {
            workers,
            queue: Some(queue),
            receiver: Some(receiver),
            handles: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        let Some(receiver) = self.receiver.take() else {
            return;
        };
        let receiver = Arc::new(Mutex::new(receiver));
        for _ in 0..self.workers {
            let receiver = receiver.clone();
            self.handles.push(tokio::spawn(async move {
                loop {
                    let task = { receiver.lock().await.recv().await };
                    match task {
                        Some(task) => task.await,
                        None => break,
                    }
                }
            }));
        }
    }

    /// Enqueues a task, suspending while the queue is saturated.
    pub async fn submit(&self, task: Task) {
        if let Some(queue) = &self.queue {
            if queue.send(task).await.is_err() {
                tracing::warn!("worker pool queue closed, task dropped");
            }
        }
    }

    /// Closes the queue and waits for every worker to return.
    pub async fn stop(&mut self) {
        self.queue.take();
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}
