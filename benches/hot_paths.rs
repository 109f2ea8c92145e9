//! Hot path benchmarks for profiling-driven optimization.
//!
//! Run with: `cargo bench --bench hot_paths`
//! Compare baselines: `cargo bench --bench hot_paths -- --baseline main`
//!
//! Key routing and node selection run on every client request; parsing
//! and framing run on every topology push.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use couchbase_topology::streaming::{Frame, JsonFramer};
use couchbase_topology::topology::{ConfigSnapshot, HashAlgorithm, NodeSelector, TopologyStore};
use reqwest::Url;
use serde_json::{json, Value};
use std::sync::Arc;

fn pool_uri() -> Url {
    Url::parse("http://127.0.0.1:8091/pools/default").unwrap()
}

/// Realistically sized config: `servers` nodes, 1024 vbuckets, one replica
fn cluster_config(servers: usize) -> Value {
    let nodes: Vec<Value> = (0..servers)
        .map(|i| {
            json!({
                "status": "healthy",
                "hostname": format!("10.0.0.{}:8091", i),
                "ports": { "direct": 11210, "proxy": 11211 },
                "couchApiBase": format!("http://10.0.0.{}:8092/default", i)
            })
        })
        .collect();
    let server_list: Vec<String> = (0..servers).map(|i| format!("10.0.0.{}:11210", i)).collect();
    let vbucket_map: Vec<Value> = (0..1024)
        .map(|vb| json!([vb % servers, (vb + 1) % servers]))
        .collect();

    json!({
        "name": "default",
        "bucketType": "membase",
        "uri": "/pools/default/buckets/default",
        "streamingUri": "/pools/default/bucketsStreaming/default",
        "nodes": nodes,
        "vBucketServerMap": {
            "hashAlgorithm": "CRC",
            "numReplicas": 1,
            "serverList": server_list,
            "vBucketMap": vbucket_map
        }
    })
}

/// Benchmark the vbucket hash alone
fn bench_crc_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc_hash");
    group.throughput(Throughput::Elements(1));

    for key_len in [8, 32, 250] {
        let key = vec![b'k'; key_len];
        group.bench_function(format!("key_len_{}", key_len), |b| {
            b.iter(|| HashAlgorithm::Crc.hash(black_box(&key)))
        });
    }

    group.finish();
}

/// Benchmark NodeSelector::pick_for_key - the per-request routing path
fn bench_pick_for_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("pick_for_key");
    group.throughput(Throughput::Elements(1));

    let store = TopologyStore::new(
        pool_uri(),
        ConfigSnapshot::from_document(&cluster_config(16), &pool_uri()).unwrap(),
        None,
    );
    let keys: Vec<String> = (0..1000).map(|i| format!("user:{}", i)).collect();

    group.bench_function("via_store", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            let snapshot = store.current();
            let server = NodeSelector::pick_for_key(&snapshot, black_box(keys[i].as_bytes()))
                .map(str::len);
            black_box(server)
        })
    });

    group.bench_function("replicas", |b| {
        let snapshot = store.current();
        b.iter(|| NodeSelector::replicas_for_key(&snapshot, black_box(b"user:42")).map(|r| r.len()))
    });

    group.finish();
}

/// Benchmark NodeSelector::pick_any
fn bench_pick_any(c: &mut Criterion) {
    let mut group = c.benchmark_group("pick_any");
    group.throughput(Throughput::Elements(1));

    let snapshot = Arc::new(ConfigSnapshot::from_document(&cluster_config(16), &pool_uri()).unwrap());
    group.bench_function("16_nodes", |b| {
        b.iter(|| NodeSelector::pick_any(black_box(&snapshot)).map(|n| n.host.len()))
    });

    group.finish();
}

/// Benchmark ConfigSnapshot::from_document for growing clusters
fn bench_parse_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_snapshot");

    for servers in [1, 8, 64] {
        let document = cluster_config(servers);
        group.bench_function(format!("servers_{}", servers), |b| {
            let base = pool_uri();
            b.iter(|| ConfigSnapshot::from_document(black_box(&document), &base))
        });
    }

    group.finish();
}

/// Benchmark JsonFramer on a stream of three documents in 1 KiB chunks
fn bench_framer(c: &mut Criterion) {
    let mut group = c.benchmark_group("json_framer");

    let mut body = Vec::new();
    for servers in [4, 8, 16] {
        body.extend(serde_json::to_vec(&cluster_config(servers)).unwrap());
        body.push(b'\n');
    }
    group.throughput(Throughput::Bytes(body.len() as u64));

    group.bench_function("chunks_1k", |b| {
        b.iter(|| {
            let mut framer = JsonFramer::new();
            let mut documents = 0;
            for chunk in body.chunks(1024) {
                framer.extend(black_box(chunk));
                while let Frame::Document(_) = framer.next_frame() {
                    documents += 1;
                }
            }
            black_box(documents)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_crc_hash,
    bench_pick_for_key,
    bench_pick_any,
    bench_parse_snapshot,
    bench_framer,
);

criterion_main!(benches);
