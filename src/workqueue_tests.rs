// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `workqueue.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn key(name: &str) -> (String, String) {
        ("team-a".to_string(), name.to_string())
    }

    #[tokio::test]
    async fn test_keys_are_deduplicated_and_fifo() {
        let queue = WorkQueue::new(3);
        queue.add(key("a"));
        queue.add(key("b"));
        queue.add(key("a"));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.get().await, Some(key("a")));
        assert_eq!(queue.get().await, Some(key("b")));
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_in_flight_is_not_handed_out_twice() {
        let queue = WorkQueue::new(3);
        queue.add(key("a"));
        let first = queue.get().await.unwrap();

        queue.add(key("a"));
        assert!(queue.is_empty());
        assert!(timeout(Duration::from_secs(1), queue.get()).await.is_err());

        queue.done(&first);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some(key("a")));
    }

    #[tokio::test]
    async fn test_done_without_readd_drops_key() {
        let queue = WorkQueue::new(3);
        queue.add(key("a"));
        let k = queue.get().await.unwrap();
        queue.done(&k);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_delivers_later() {
        let queue = WorkQueue::new(3);
        queue.add_after(key("a"), Duration::from_secs(30));
        assert!(queue.is_empty());

        let got = timeout(Duration::from_secs(31), queue.get()).await.unwrap();
        assert_eq!(got, Some(key("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_retries_until_exhausted() {
        let queue = WorkQueue::new(2);
        assert!(queue.add_rate_limited(key("a")));
        assert_eq!(queue.num_requeues(&key("a")), 1);
        assert!(queue.add_rate_limited(key("a")));
        assert_eq!(queue.num_requeues(&key("a")), 2);

        assert!(!queue.add_rate_limited(key("a")));
        assert_eq!(queue.num_requeues(&key("a")), 0);

        // the scheduled retries still arrive, collapsed into one pending entry
        let got = timeout(Duration::from_secs(5), queue.get()).await.unwrap();
        assert_eq!(got, Some(key("a")));
    }

    #[tokio::test]
    async fn test_forget_resets_failures() {
        let queue = WorkQueue::new(5);
        queue.add_rate_limited(key("a"));
        queue.add_rate_limited(key("a"));
        queue.forget(&key("a"));
        assert_eq!(queue.num_requeues(&key("a")), 0);
    }

    #[tokio::test]
    async fn test_shut_down_wakes_waiters() {
        let queue: WorkQueue<(String, String)> = WorkQueue::new(3);
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::task::yield_now().await;

        queue.shut_down();
        assert_eq!(waiter.await.unwrap(), None);

        queue.add(key("late"));
        assert!(queue.is_empty());
        assert!(queue.is_shutting_down());
    }

    #[tokio::test]
    async fn test_parallel_workers_each_get_distinct_keys() {
        let queue = WorkQueue::new(3);
        for name in ["a", "b", "c"] {
            queue.add(key(name));
        }
        let mut handles = Vec::new();
        for _ in 0..3 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move { queue.get().await.unwrap() }));
        }
        let mut got = Vec::new();
        for handle in handles {
            got.push(handle.await.unwrap().1);
        }
        got.sort();
        assert_eq!(got, vec!["a", "b", "c"]);
    }
}
