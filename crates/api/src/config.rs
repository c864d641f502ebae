//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use broker::AmqpOptions;
use common::DEFAULT_STOCK_QUEUE;
use ordering::CoordinatorConfig;

/// Which of the two services a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Orders,
    Inventory,
}

impl Service {
    pub fn default_port(&self) -> u16 {
        match self {
            Service::Orders => 3002,
            Service::Inventory => 3001,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Service::Orders => "order-service",
            Service::Inventory => "inventory-service",
        }
    }
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3002` for orders, `3001` for inventory)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `AMQP_URL`: broker URI (default: `"amqp://127.0.0.1:5672/%2f"`)
/// - `DATABASE_URL`: PostgreSQL URL; in-memory stores when unset
/// - `STOCK_QUEUE`: stock check queue (default: `"stock_queue"`)
/// - `STOCK_CHECK_TIMEOUT_MS`: stock check deadline (default: `5000`)
/// - `MAX_PENDING_STOCK_CHECKS`: concurrent stock checks (default: `256`)
/// - `WORKER_CONCURRENCY`: reservation workers (default: `4`)
/// - `AMQP_PREFETCH`: unacked deliveries per consumer (default: `16`)
/// - `BROKER_CHECK_INTERVAL_MS`: how often the broker connection is checked
///   (default: `1000`)
///
/// Unparseable numbers fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub service: Service,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub amqp_url: String,
    pub database_url: Option<String>,
    pub stock_queue: String,
    pub stock_check_timeout: Duration,
    pub max_pending_stock_checks: usize,
    pub worker_concurrency: usize,
    pub amqp_prefetch: u16,
    pub broker_check_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env(service: Service) -> Self {
        Self::from_lookup(service, |key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(service: Service, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::defaults(service);

        Self {
            service,
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            amqp_url: lookup("AMQP_URL").unwrap_or(defaults.amqp_url),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            stock_queue: lookup("STOCK_QUEUE")
                .filter(|q| !q.trim().is_empty())
                .unwrap_or(defaults.stock_queue),
            stock_check_timeout: parse_var(&lookup, "STOCK_CHECK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.stock_check_timeout),
            max_pending_stock_checks: parse_var::<usize>(&lookup, "MAX_PENDING_STOCK_CHECKS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_pending_stock_checks),
            worker_concurrency: parse_var::<usize>(&lookup, "WORKER_CONCURRENCY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.worker_concurrency),
            amqp_prefetch: parse_var(&lookup, "AMQP_PREFETCH").unwrap_or(defaults.amqp_prefetch),
            broker_check_interval: parse_var::<u64>(&lookup, "BROKER_CHECK_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.broker_check_interval),
        }
    }

    /// Returns the defaults for `service`.
    pub fn defaults(service: Service) -> Self {
        Self {
            service,
            host: "0.0.0.0".to_string(),
            port: service.default_port(),
            log_level: "info".to_string(),
            amqp_url: "amqp://127.0.0.1:5672/%2f".to_string(),
            database_url: None,
            stock_queue: DEFAULT_STOCK_QUEUE.to_string(),
            stock_check_timeout: Duration::from_millis(5000),
            max_pending_stock_checks: 256,
            worker_concurrency: 4,
            amqp_prefetch: 16,
            broker_check_interval: Duration::from_millis(1000),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_stock_queue(self.stock_queue.clone())
            .with_reply_timeout(self.stock_check_timeout)
            .with_max_pending(self.max_pending_stock_checks)
    }

    pub fn amqp_options(&self) -> AmqpOptions {
        AmqpOptions {
            connection_name: self.service.name().to_string(),
            prefetch: self.amqp_prefetch,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(service: Service, pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(service, |key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::defaults(Service::Orders);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3002);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.stock_queue, "stock_queue");
        assert_eq!(config.stock_check_timeout, Duration::from_secs(5));
        assert!(config.database_url.is_none());

        assert_eq!(Config::defaults(Service::Inventory).port, 3001);
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        assert_eq!(
            from_pairs(Service::Inventory, &[]),
            Config::defaults(Service::Inventory)
        );
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(
            Service::Orders,
            &[
                ("PORT", "8080"),
                ("AMQP_URL", "amqp://rabbit:5672/%2f"),
                ("DATABASE_URL", "postgres://db/orders"),
                ("STOCK_QUEUE", "checks"),
                ("STOCK_CHECK_TIMEOUT_MS", "250"),
                ("MAX_PENDING_STOCK_CHECKS", "8"),
                ("WORKER_CONCURRENCY", "2"),
                ("AMQP_PREFETCH", "1"),
                ("BROKER_CHECK_INTERVAL_MS", "200"),
            ],
        );

        assert_eq!(config.port, 8080);
        assert_eq!(config.amqp_url, "amqp://rabbit:5672/%2f");
        assert_eq!(config.database_url.as_deref(), Some("postgres://db/orders"));
        assert_eq!(config.stock_queue, "checks");
        assert_eq!(config.stock_check_timeout, Duration::from_millis(250));
        assert_eq!(config.max_pending_stock_checks, 8);
        assert_eq!(config.worker_concurrency, 2);
        assert_eq!(config.amqp_prefetch, 1);
        assert_eq!(config.broker_check_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = from_pairs(
            Service::Orders,
            &[
                ("PORT", "not-a-port"),
                ("STOCK_CHECK_TIMEOUT_MS", "-5"),
                ("MAX_PENDING_STOCK_CHECKS", "0"),
                ("DATABASE_URL", ""),
                ("BROKER_CHECK_INTERVAL_MS", "0"),
            ],
        );

        assert_eq!(config.port, 3002);
        assert_eq!(config.stock_check_timeout, Duration::from_secs(5));
        assert_eq!(config.max_pending_stock_checks, 256);
        assert!(config.database_url.is_none());
        assert_eq!(config.broker_check_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::defaults(Service::Orders)
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_derived_settings() {
        let config = from_pairs(Service::Inventory, &[("AMQP_PREFETCH", "4")]);
        assert_eq!(config.amqp_options().prefetch, 4);
        assert_eq!(config.amqp_options().connection_name, "inventory-service");

        let coordinator = Config::defaults(Service::Orders).coordinator_config();
        assert_eq!(coordinator.max_pending, 256);
        assert_eq!(coordinator.reply_timeout, Duration::from_secs(5));
    }
}
