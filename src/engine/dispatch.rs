//! ### English
//! Owner-thread task queue.
//!
//! Compositor callbacks arrive on arbitrary threads; everything that touches renderer state is
//! posted here and executed by `tick()` on the thread that owns the presenter.
//!
//! ### 中文
//! 属主线程任务队列。
//!
//! 合成器回调可能在任意线程到达；所有会触及渲染器状态的逻辑都投递到这里，
//! 并由持有 presenter 的线程在 `tick()` 中执行。

use std::sync::Arc;

use crossbeam_channel as channel;
use tracing::trace;

use crate::engine::error::PresentError;

/// ### English
/// Work item executed on the owner thread.
///
/// ### 中文
/// 在属主线程执行的工作项。
pub type OwnerTask = Box<dyn FnOnce() + Send + 'static>;

/// ### English
/// Called after every post so the embedder can schedule a `tick()`.
///
/// ### 中文
/// 每次投递后调用，便于宿主安排一次 `tick()`。
pub type Waker = Arc<dyn Fn() + Send + Sync + 'static>;

/// ### English
/// Receiving side; owned by the presenter on the owner thread.
///
/// ### 中文
/// 接收端；由属主线程上的 presenter 持有。
pub struct OwnerTaskQueue {
    tx: channel::Sender<OwnerTask>,
    rx: channel::Receiver<OwnerTask>,
    waker: Option<Waker>,
}

/// ### English
/// Cloneable posting handle, safe to move into callbacks running on any thread.
///
/// ### 中文
/// 可克隆的投递句柄，可安全地移入在任意线程运行的回调。
#[derive(Clone)]
pub struct OwnerTaskSender {
    tx: channel::Sender<OwnerTask>,
    waker: Option<Waker>,
}

impl OwnerTaskQueue {
    pub fn new(waker: Option<Waker>) -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx, waker }
    }

    pub fn sender(&self) -> OwnerTaskSender {
        OwnerTaskSender {
            tx: self.tx.clone(),
            waker: self.waker.clone(),
        }
    }

    /// ### English
    /// Runs the tasks that were queued when the call started, in posting order, and returns how
    /// many ran. Tasks posted while draining wait for the next tick.
    ///
    /// ### 中文
    /// 按投递顺序执行调用开始时已排队的任务，并返回执行数量。
    /// drain 期间新投递的任务留到下一次 tick。
    pub fn tick(&self) -> usize {
        let snapshot = self.rx.len();
        let mut ran = 0usize;
        while ran < snapshot {
            let Ok(task) = self.rx.try_recv() else {
                break;
            };
            task();
            ran += 1;
        }
        if ran > 0 {
            trace!(ran, "owner tasks drained");
        }
        ran
    }
}

impl OwnerTaskSender {
    /// ### English
    /// Posts `task`. Returns `false` (and drops the task) once the queue is gone.
    ///
    /// ### 中文
    /// 投递 `task`。队列已销毁时返回 `false` 并丢弃该任务。
    pub fn post(&self, task: OwnerTask) -> bool {
        match self.try_post(task) {
            Ok(()) => true,
            Err(_) => {
                trace!("owner queue closed; dropping task");
                false
            }
        }
    }

    pub fn try_post(&self, task: OwnerTask) -> Result<(), PresentError> {
        self.tx.send(task).map_err(|_| PresentError::QueueClosed)?;
        if let Some(waker) = &self.waker {
            waker();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_tasks_in_posting_order() {
        let queue = OwnerTaskQueue::new(None);
        let sender = queue.sender();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            let seen = seen.clone();
            sender.post(Box::new(move || seen.lock().unwrap().push(i)));
        }
        assert_eq!(seen.lock().unwrap().len(), 0);
        assert_eq!(queue.tick(), 4);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(queue.tick(), 0);
    }

    #[test]
    fn tasks_posted_during_tick_run_next_tick() {
        let queue = OwnerTaskQueue::new(None);
        let sender = queue.sender();
        let inner = sender.clone();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_inner = hits.clone();
        sender.post(Box::new(move || {
            inner.post(Box::new(move || {
                hits_inner.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        assert_eq!(queue.tick(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(queue.tick(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn waker_fires_per_post() {
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = wakes.clone();
        let queue = OwnerTaskQueue::new(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        let sender = queue.sender();
        sender.post(Box::new(|| {}));
        sender.post(Box::new(|| {}));
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn post_from_other_thread_runs_on_ticking_thread() {
        let queue = OwnerTaskQueue::new(None);
        let sender = queue.sender();
        let owner = std::thread::current().id();
        let ran_on = Arc::new(Mutex::new(None));
        let slot = ran_on.clone();
        std::thread::spawn(move || {
            sender.post(Box::new(move || {
                *slot.lock().unwrap() = Some(std::thread::current().id());
            }));
        })
        .join()
        .unwrap();

        assert_eq!(queue.tick(), 1);
        assert_eq!(*ran_on.lock().unwrap(), Some(owner));
    }

    #[test]
    fn closed_queue_rejects_posts() {
        let queue = OwnerTaskQueue::new(None);
        let sender = queue.sender();
        drop(queue);
        assert!(matches!(
            sender.try_post(Box::new(|| {})),
            Err(PresentError::QueueClosed)
        ));
        assert!(!sender.post(Box::new(|| {})));
    }
}
