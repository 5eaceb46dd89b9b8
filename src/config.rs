use std::num::ParseIntError;
use std::str::FromStr;
use std::string::String;
use std::time::Duration;
use std::{env, fmt};

/// Stream every normalized record is published to.
pub const TOPIC: &str = "device.activity.NewCan";
/// Every record goes to the same partition.
pub const PARTITION: i32 = 0;
/// Constant message key. Downstream consumers rely on it, so per-device
/// ordering is not available even though records carry a `uniqueId`.
pub const PARTITION_KEY: &str = "alldata";

#[derive(Debug, Clone)]
pub struct Config {
    pub brokers: String,
    pub acks: String,
    pub retries: u32,
    pub linger_ms: u64,
    pub ack_timeout: Duration,
    pub flush_timeout: Duration,
    pub publish_mode: PublishMode,
    pub max_in_flight: usize,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub enum PublishMode {
    /// Publish one record and wait for its acknowledgment before the next.
    #[default]
    Sequential,
    /// Validate the whole batch, then keep several publishes in flight.
    Pipelined,
}

impl FromStr for PublishMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "Sequential" | "sequential" => Ok(PublishMode::Sequential),
            "Pipelined" | "pipelined" => Ok(PublishMode::Pipelined),
            other => Err(format!("Invalid or Unsupported publish mode {}", other)),
        }
    }
}

impl fmt::Display for PublishMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Config {
    pub fn load_from_env() -> Result<Config, String> {
        let brokers = env::var("KAFKA_BROKERS")
            .map_err(|e| format!("KAFKA_BROKERS not set - {}", e))?
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        if brokers.is_empty() {
            return Err("KAFKA_BROKERS does not contain any broker address".to_string());
        }

        let conf = Config {
            brokers,
            acks: env::var("KAFKA_ACKS").unwrap_or("1".to_string()),
            retries: env::var("KAFKA_RETRIES")
                .unwrap_or("5".to_string())
                .parse::<u32>()
                .map_err(|e| format!("Error parsing KAFKA_RETRIES to u32 - {}", e))?,
            linger_ms: env::var("KAFKA_LINGER_MS")
                .unwrap_or("10".to_string())
                .parse::<u64>()
                .map_err(|e| format!("Error parsing KAFKA_LINGER_MS to u64 - {}", e))?,
            ack_timeout: env::var("ACK_TIMEOUT_SECS")
                .unwrap_or("10".to_string())
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e: ParseIntError| {
                    format!("Error parsing ACK_TIMEOUT_SECS to u64 - {}", e)
                })?,
            flush_timeout: env::var("FLUSH_TIMEOUT_SECS")
                .unwrap_or("10".to_string())
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e: ParseIntError| {
                    format!("Error parsing FLUSH_TIMEOUT_SECS to u64 - {}", e)
                })?,
            publish_mode: env::var("PUBLISH_MODE")
                .unwrap_or("Sequential".to_string())
                .parse::<PublishMode>()?,
            max_in_flight: env::var("MAX_IN_FLIGHT")
                .unwrap_or("100".to_string())
                .parse::<usize>()
                .map_err(|e| format!("Error parsing MAX_IN_FLIGHT to usize - {}", e))?,
        };

        if conf.max_in_flight == 0 {
            return Err("MAX_IN_FLIGHT must be at least 1".to_string());
        }

        Ok(conf)
    }
}
