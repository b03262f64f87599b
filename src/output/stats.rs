//! Queue statistics for the `--stats` report

use crate::queue::{JobQueue, QueueCounts};
use crate::state::Lane;
use crate::QueueResult;

/// Per-lane counts at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatistics {
    pub crawl: QueueCounts,
    pub processing: QueueCounts,
}

impl QueueStatistics {
    pub fn lane(&self, lane: Lane) -> &QueueCounts {
        match lane {
            Lane::Crawl => &self.crawl,
            Lane::Processing => &self.processing,
        }
    }
}

/// Loads statistics from the queue
pub fn load_statistics(queue: &JobQueue) -> QueueResult<QueueStatistics> {
    Ok(QueueStatistics {
        crawl: queue.counts(Lane::Crawl)?,
        processing: queue.counts(Lane::Processing)?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &QueueStatistics) {
    println!("=== Queue Statistics ===\n");

    for lane in Lane::all() {
        let counts = stats.lane(lane);
        println!("{} lane ({} jobs):", lane, counts.total());
        println!("  Waiting:   {}", counts.waiting);
        println!("  Delayed:   {}", counts.delayed);
        println!("  Active:    {}", counts.active);
        println!("  Completed: {}", counts.completed);
        println!("  Failed:    {}", counts.failed);

        let finished = counts.completed + counts.failed;
        if finished > 0 {
            let success_rate = counts.completed as f64 / finished as f64 * 100.0;
            println!(
                "  Success Rate: {:.1}% ({} / {} finished jobs)",
                success_rate, counts.completed, finished
            );
        }
        println!();
    }
}
