//! The fixed worker pool used by the meshing stage.

use std::num::NonZeroUsize;
use std::thread;

/// Runs one task per item on a pool sized to hardware concurrency and
/// returns the results in submission order.
///
/// Tasks must be independent; the meshers guarantee that by handing each
/// task its own chunk and treating the model as read-only.
pub fn parallel_map<T, R, F>(items: Vec<T>, task: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(items.len());

    if workers <= 1 {
        return items.into_iter().map(task).collect();
    }

    let count = items.len();
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, T)>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, R)>();

    for job in items.into_iter().enumerate() {
        job_tx.send(job).expect("job channel closed before dispatch");
    }
    drop(job_tx);

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let task = &task;
            scope.spawn(move || {
                for (index, item) in job_rx {
                    if result_tx.send((index, task(item))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut results: Vec<Option<R>> = (0..count).map(|_| None).collect();
        for (index, result) in result_rx {
            results[index] = Some(result);
        }
        results
            .into_iter()
            .map(|slot| slot.expect("worker dropped a task"))
            .collect()
    })
}
