//! Structured metrics snapshot pushed by the dashboard feed.
//!
//! A [`MetricsSnapshot`] is always complete: every field has a
//! zero/placeholder default so a snapshot decoded from a sparse payload,
//! or the default snapshot shown before the first push, can be rendered
//! without null checks. Snapshots are replaced wholesale, never merged.
//!
//! Decoding is best-effort below the top level. A field whose value does
//! not fit (`null`, a float where a count is expected, a numeric string,
//! a short load-average array) takes its default instead of failing the
//! snapshot. Only a `data` payload that is not a JSON object is rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::PLACEHOLDER;

fn placeholder() -> String {
    PLACEHOLDER.to_string()
}

/// Complete set of subsystem metrics at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSnapshot {
    #[serde(deserialize_with = "lenient::section")]
    pub system: SystemMetrics,
    #[serde(deserialize_with = "lenient::list")]
    pub containers: Vec<ContainerStats>,
    #[serde(deserialize_with = "lenient::section")]
    pub cache: CacheStats,
    /// Queue name -> number of pending messages.
    #[serde(deserialize_with = "lenient::counts")]
    pub queues: BTreeMap<String, u64>,
    #[serde(deserialize_with = "lenient::section")]
    pub database: DatabaseStats,
    #[serde(deserialize_with = "lenient::list")]
    pub workers: Vec<WorkerStatus>,
    #[serde(deserialize_with = "lenient::list")]
    pub alerts: Vec<Alert>,
    /// Subsystems this client does not model, kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MetricsSnapshot {
    /// Total depth across every reported queue.
    pub fn total_queue_depth(&self) -> u64 {
        self.queues.values().sum()
    }

    /// Number of containers whose status reads as running.
    pub fn running_containers(&self) -> usize {
        self.containers
            .iter()
            .filter(|c| c.status.eq_ignore_ascii_case("running"))
            .count()
    }
}

/// Host resource usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemMetrics {
    #[serde(deserialize_with = "lenient::string")]
    pub hostname: String,
    #[serde(deserialize_with = "lenient::float")]
    pub cpu_percent: f64,
    #[serde(deserialize_with = "lenient::float")]
    pub memory_percent: f64,
    #[serde(deserialize_with = "lenient::float")]
    pub memory_used_mb: f64,
    #[serde(deserialize_with = "lenient::float")]
    pub memory_total_mb: f64,
    #[serde(deserialize_with = "lenient::float")]
    pub disk_percent: f64,
    #[serde(deserialize_with = "lenient::float")]
    pub disk_used_gb: f64,
    #[serde(deserialize_with = "lenient::float")]
    pub disk_total_gb: f64,
    /// 1, 5 and 15 minute load averages. Missing entries read as zero.
    #[serde(deserialize_with = "lenient::triple")]
    pub load_average: [f64; 3],
    #[serde(deserialize_with = "lenient::string")]
    pub uptime: String,
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self {
            hostname: placeholder(),
            cpu_percent: 0.0,
            memory_percent: 0.0,
            memory_used_mb: 0.0,
            memory_total_mb: 0.0,
            disk_percent: 0.0,
            disk_used_gb: 0.0,
            disk_total_gb: 0.0,
            load_average: [0.0; 3],
            uptime: placeholder(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerStats {
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(deserialize_with = "lenient::float")]
    pub cpu_percent: f64,
    #[serde(deserialize_with = "lenient::float")]
    pub memory_mb: f64,
}

impl Default for ContainerStats {
    fn default() -> Self {
        Self {
            name: placeholder(),
            status: placeholder(),
            cpu_percent: 0.0,
            memory_mb: 0.0,
        }
    }
}

/// Key-value cache (e.g. Redis) statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheStats {
    #[serde(deserialize_with = "lenient::unsigned")]
    pub connected_clients: u64,
    #[serde(deserialize_with = "lenient::string")]
    pub used_memory: String,
    #[serde(deserialize_with = "lenient::float")]
    pub hit_rate: f64,
    #[serde(deserialize_with = "lenient::unsigned")]
    pub keys: u64,
    #[serde(deserialize_with = "lenient::string")]
    pub uptime: String,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self {
            connected_clients: 0,
            used_memory: placeholder(),
            hit_rate: 0.0,
            keys: 0,
            uptime: placeholder(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseStats {
    #[serde(deserialize_with = "lenient::unsigned")]
    pub connections: u64,
    #[serde(deserialize_with = "lenient::unsigned")]
    pub active_queries: u64,
    #[serde(deserialize_with = "lenient::string")]
    pub size: String,
    #[serde(deserialize_with = "lenient::string")]
    pub version: String,
}

impl Default for DatabaseStats {
    fn default() -> Self {
        Self {
            connections: 0,
            active_queries: 0,
            size: placeholder(),
            version: placeholder(),
        }
    }
}

/// Background worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerStatus {
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub status: String,
    #[serde(deserialize_with = "lenient::unsigned")]
    pub active_tasks: u64,
    #[serde(deserialize_with = "lenient::unsigned")]
    pub processed: u64,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self {
            name: placeholder(),
            status: placeholder(),
            active_tasks: 0,
            processed: 0,
        }
    }
}

/// Alert raised by the backend for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Alert {
    #[serde(deserialize_with = "lenient::string")]
    pub level: String,
    #[serde(deserialize_with = "lenient::string")]
    pub message: String,
}

impl Default for Alert {
    fn default() -> Self {
        Self {
            level: placeholder(),
            message: placeholder(),
        }
    }
}

/// Field decoders that coerce or default instead of failing.
mod lenient {
    use std::collections::BTreeMap;

    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::placeholder;

    fn number(value: &Value) -> Option<f64> {
        let n = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        n.filter(|n| n.is_finite())
    }

    /// Negative values clamp to zero, fractions truncate.
    fn count(value: &Value) -> u64 {
        if let Some(n) = value.as_u64() {
            return n;
        }
        number(value).map_or(0, |n| n.max(0.0) as u64)
    }

    pub fn float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(number(&Value::deserialize(deserializer)?).unwrap_or(0.0))
    }

    pub fn unsigned<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        Ok(count(&Value::deserialize(deserializer)?))
    }

    pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => placeholder(),
        })
    }

    pub fn triple<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[f64; 3], D::Error> {
        let mut out = [0.0; 3];
        if let Value::Array(items) = Value::deserialize(deserializer)? {
            for (slot, item) in out.iter_mut().zip(&items) {
                *slot = number(item).unwrap_or(0.0);
            }
        }
        Ok(out)
    }

    pub fn counts<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, u64>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Object(map) => map
                .into_iter()
                .map(|(name, depth)| {
                    let depth = count(&depth);
                    (name, depth)
                })
                .collect(),
            _ => BTreeMap::new(),
        })
    }

    /// A subsystem object; anything else yields the subsystem default.
    pub fn section<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    /// A list of objects; entries that are not objects are skipped.
    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_fully_populated() {
        let snap = MetricsSnapshot::default();
        assert_eq!(snap.system.hostname, PLACEHOLDER);
        assert_eq!(snap.system.uptime, PLACEHOLDER);
        assert_eq!(snap.system.cpu_percent, 0.0);
        assert_eq!(snap.cache.used_memory, PLACEHOLDER);
        assert_eq!(snap.database.version, PLACEHOLDER);
        assert_eq!(snap.total_queue_depth(), 0);
        assert!(snap.containers.is_empty());
        assert!(snap.extra.is_empty());
    }

    #[test]
    fn sparse_payload_fills_defaults() {
        let snap: MetricsSnapshot =
            serde_json::from_str(r#"{"system":{"cpu_percent":42.5}}"#).unwrap();
        assert_eq!(snap.system.cpu_percent, 42.5);
        assert_eq!(snap.system.hostname, PLACEHOLDER);
        assert_eq!(snap.database, DatabaseStats::default());
    }

    #[test]
    fn full_payload_decodes() {
        let json = r#"{
            "system": {"hostname":"web-1","cpu_percent":12.0,"memory_percent":55.1,
                       "memory_used_mb":4096,"memory_total_mb":8192,"disk_percent":71.0,
                       "disk_used_gb":140.5,"disk_total_gb":200.0,
                       "load_average":[0.5,0.7,0.9],"uptime":"3d 4h"},
            "containers": [{"name":"api","status":"running","cpu_percent":3.2,"memory_mb":256.0},
                           {"name":"worker","status":"exited"}],
            "cache": {"connected_clients":5,"used_memory":"1.2M","hit_rate":0.93,"keys":1200,"uptime":"2d"},
            "queues": {"default":3,"emails":7},
            "database": {"connections":12,"active_queries":2,"size":"512 MB","version":"16.2"},
            "workers": [{"name":"celery@1","status":"online","active_tasks":1,"processed":900}],
            "alerts": [{"level":"warning","message":"Disk above 70%"}]
        }"#;
        let snap: MetricsSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.system.hostname, "web-1");
        assert_eq!(snap.system.load_average, [0.5, 0.7, 0.9]);
        assert_eq!(snap.running_containers(), 1);
        assert_eq!(snap.containers[1].memory_mb, 0.0);
        assert_eq!(snap.total_queue_depth(), 10);
        assert_eq!(snap.workers[0].processed, 900);
        assert_eq!(snap.alerts[0].message, "Disk above 70%");
    }

    #[test]
    fn unknown_subsystems_are_kept() {
        let snap: MetricsSnapshot =
            serde_json::from_str(r#"{"gpu":{"util":80},"queues":{"a":1}}"#).unwrap();
        assert_eq!(snap.extra["gpu"]["util"], 80);
        assert!(!snap.extra.contains_key("queues"));
    }

    #[test]
    fn null_values_take_defaults() {
        let snap: MetricsSnapshot = serde_json::from_str(
            r#"{"system":{"cpu_percent":null,"hostname":null},"cache":null,"alerts":null}"#,
        )
        .unwrap();
        assert_eq!(snap.system.cpu_percent, 0.0);
        assert_eq!(snap.system.hostname, PLACEHOLDER);
        assert_eq!(snap.cache, CacheStats::default());
        assert!(snap.alerts.is_empty());
    }

    #[test]
    fn numbers_are_coerced() {
        let snap: MetricsSnapshot = serde_json::from_str(
            r#"{"system":{"memory_used_mb":4096.5,"cpu_percent":"12.5"},
                "queues":{"celery":"3","mail":2.9,"dead":-4},
                "database":{"connections":-1,"active_queries":7.0,"version":16},
                "workers":[{"name":"w1","processed":"not a number"}]}"#,
        )
        .unwrap();
        assert_eq!(snap.system.memory_used_mb, 4096.5);
        assert_eq!(snap.system.cpu_percent, 12.5);
        assert_eq!(snap.queues["celery"], 3);
        assert_eq!(snap.queues["mail"], 2);
        assert_eq!(snap.queues["dead"], 0);
        assert_eq!(snap.database.connections, 0);
        assert_eq!(snap.database.active_queries, 7);
        assert_eq!(snap.database.version, "16");
        assert_eq!(snap.workers[0].processed, 0);
    }

    #[test]
    fn short_or_scalar_load_average() {
        let snap: MetricsSnapshot =
            serde_json::from_str(r#"{"system":{"load_average":[0.1,0.2]}}"#).unwrap();
        assert_eq!(snap.system.load_average, [0.1, 0.2, 0.0]);

        let snap: MetricsSnapshot =
            serde_json::from_str(r#"{"system":{"load_average":1.5}}"#).unwrap();
        assert_eq!(snap.system.load_average, [0.0; 3]);
    }

    #[test]
    fn misshapen_sections_fall_back() {
        let snap: MetricsSnapshot = serde_json::from_str(
            r#"{"system":"down","containers":[{"name":"api"},"garbage",3],"queues":[1,2]}"#,
        )
        .unwrap();
        assert_eq!(snap.system, SystemMetrics::default());
        assert_eq!(snap.containers.len(), 1);
        assert_eq!(snap.containers[0].name, "api");
        assert!(snap.queues.is_empty());
    }

    #[test]
    fn non_object_payload_is_rejected() {
        assert!(serde_json::from_str::<MetricsSnapshot>(r#""offline""#).is_err());
        assert!(serde_json::from_str::<MetricsSnapshot>("[1,2]").is_err());
        assert!(serde_json::from_str::<MetricsSnapshot>("null").is_err());
    }
}
