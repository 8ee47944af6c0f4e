//! Benchmark utilities.

use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use websql_bridge::{Resolution, ScriptedBridge};
use websql_core::{Database, WebSql};

/// Generate `count` random bind parameters.
pub fn random_params(count: usize) -> Vec<Value> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| match i % 3 {
            0 => json!(rng.gen::<i64>()),
            1 => json!(rng.gen::<f64>()),
            _ => json!(format!("v{}", rng.gen::<u32>())),
        })
        .collect()
}

/// Generate `count` rows shaped like `{ "id": n, "body": "..." }`.
pub fn generate_rows(count: usize, body_size: usize) -> Vec<Value> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|id| {
            let body: String = (0..body_size)
                .map(|_| rng.gen_range(b'a'..=b'z') as char)
                .collect();
            json!({ "id": id, "body": body })
        })
        .collect()
}

/// Open a database on a fresh scripted backend.
pub fn scripted_database(resolution: Resolution) -> (Arc<ScriptedBridge>, Database) {
    let bridge = Arc::new(ScriptedBridge::with_resolution(resolution));
    let websql = WebSql::new(Arc::clone(&bridge));
    let db = websql
        .open_database("bench", "1.0", "Bench", 0)
        .expect("open bench database");
    bridge.run_until_idle();
    (bridge, db)
}
