//! Thread budget for the score stage
//!
//! VMAF runs are CPU bound and long lived. Cores are treated as a fixed
//! budget split between width (parallel score workers) and depth (libvmaf
//! `n_threads` per worker):
//!
//! `parallel_tasks * child_threads <= available_cores`

/// Default upper bound on concurrent score workers
pub const DEFAULT_MAX_SCORE_WORKERS: usize = 4;

/// Thread allocation result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAllocation {
    /// Number of parallel score workers
    pub parallel_tasks: usize,
    /// Threads handed to each child process (libvmaf n_threads)
    pub child_threads: usize,
}

/// Cores left after reserving 20% (min 1, max 2) for the OS and the encoder
pub fn available_cores(total_cores: usize) -> usize {
    let reserved = (total_cores as f64 * 0.2).ceil() as usize;
    let reserved = reserved.clamp(1, 2);
    total_cores.saturating_sub(reserved).max(1)
}

/// Split `total_cores` between at most `max_workers` score workers
pub fn allocate_for_cores(total_cores: usize, max_workers: usize) -> ThreadAllocation {
    let available = available_cores(total_cores);
    let parallel_tasks = max_workers.max(1).min(available);
    let child_threads = (available / parallel_tasks).max(1);

    ThreadAllocation {
        parallel_tasks,
        child_threads,
    }
}

/// Score-stage allocation for this machine
pub fn score_stage_allocation(max_workers: usize) -> ThreadAllocation {
    allocate_for_cores(num_cpus::get(), max_workers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_machine_single_worker() {
        let alloc = allocate_for_cores(2, 4);
        assert_eq!(alloc.parallel_tasks, 1);
        assert_eq!(alloc.child_threads, 1);
    }

    #[test]
    fn test_budget_never_exceeds_available() {
        for cores in 1..=64 {
            for workers in 1..=8 {
                let alloc = allocate_for_cores(cores, workers);
                assert!(alloc.parallel_tasks >= 1);
                assert!(alloc.child_threads >= 1);
                assert!(alloc.parallel_tasks <= workers);
                assert!(alloc.parallel_tasks * alloc.child_threads <= available_cores(cores));
            }
        }
    }

    #[test]
    fn test_ten_core_machine() {
        // 10 cores - 2 reserved = 8; 4 workers x 2 threads
        let alloc = allocate_for_cores(10, 4);
        assert_eq!(alloc, ThreadAllocation { parallel_tasks: 4, child_threads: 2 });
    }

    #[test]
    fn test_zero_workers_treated_as_one() {
        let alloc = allocate_for_cores(16, 0);
        assert_eq!(alloc.parallel_tasks, 1);
    }

    #[test]
    fn test_current_machine() {
        let alloc = score_stage_allocation(DEFAULT_MAX_SCORE_WORKERS);
        assert!(alloc.parallel_tasks <= DEFAULT_MAX_SCORE_WORKERS);
    }
}
