//! Per-client request rate limiting to prevent abuse

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::constants::MAX_TRACKED_CLIENTS;

/// Sliding-window request limiter keyed by client IP
pub struct IpRateLimiter {
    request_times: RwLock<HashMap<IpAddr, Vec<Instant>>>,
    max_requests: u32,
    window_duration: Duration,
    /// Maximum number of clients to track to prevent memory exhaustion
    max_tracked_clients: usize,
}

impl IpRateLimiter {
    pub fn new(max_requests: u32, window_duration: Duration) -> Self {
        Self {
            request_times: RwLock::new(HashMap::new()),
            max_requests,
            window_duration,
            max_tracked_clients: MAX_TRACKED_CLIENTS,
        }
    }

    /// Record a request from `ip` and report whether it is within the limit
    pub async fn allow_request(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut times = self.request_times.write().await;

        // Evict the least recently seen client when full
        if times.len() >= self.max_tracked_clients && !times.contains_key(&ip) {
            let oldest = times
                .iter()
                .min_by_key(|(_, client_times)| client_times.last().copied().unwrap_or(now))
                .map(|(client, _)| *client);
            if let Some(oldest) = oldest {
                times.remove(&oldest);
                log::debug!("Evicted oldest client from rate limiter");
            }
        }

        let client_times = times.entry(ip).or_default();
        client_times.retain(|&time| now.duration_since(time) < self.window_duration);

        if client_times.len() < self.max_requests as usize {
            client_times.push(now);
            true
        } else {
            false
        }
    }

    /// Requests counted for `ip` in the current window
    pub async fn get_request_count(&self, ip: IpAddr) -> usize {
        let times = self.request_times.read().await;
        let now = Instant::now();
        times
            .get(&ip)
            .map(|client_times| {
                client_times
                    .iter()
                    .filter(|&&time| now.duration_since(time) < self.window_duration)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drop expired timestamps and idle clients
    pub async fn cleanup_old_entries(&self) {
        let now = Instant::now();
        let mut times = self.request_times.write().await;
        times.retain(|_, client_times| {
            client_times.retain(|&time| now.duration_since(time) < self.window_duration);
            !client_times.is_empty()
        });
    }

    pub async fn get_tracked_clients_count(&self) -> usize {
        self.request_times.read().await.len()
    }

    /// Start cleanup task for the limiter
    pub fn start_cleanup_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                self.cleanup_old_entries().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([203, 0, 113, last])
    }

    #[tokio::test]
    async fn test_limit_per_client() {
        let limiter = IpRateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.allow_request(ip(1)).await);
        assert!(limiter.allow_request(ip(1)).await);
        assert!(!limiter.allow_request(ip(1)).await);
        assert!(limiter.allow_request(ip(2)).await);
        assert_eq!(limiter.get_request_count(ip(1)).await, 2);
    }

    #[tokio::test]
    async fn test_window_expiry_and_cleanup() {
        let limiter = IpRateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.allow_request(ip(1)).await);
        assert!(!limiter.allow_request(ip(1)).await);

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.cleanup_old_entries().await;
        assert_eq!(limiter.get_tracked_clients_count().await, 0);
        assert!(limiter.allow_request(ip(1)).await);
    }
}
