use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use propdesk_core::{EntityId, TenantId};
use propdesk_infra::cache::{CacheEntity, CacheService, InMemoryCacheStore, KeyMapper};
use propdesk_infra::repo::{InMemoryPropertyRepository, PropertyRepository};
use propdesk_properties::{NewProperty, Property};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn property(tenant: TenantId, i: usize) -> Property {
    NewProperty::new(&format!("Building {i}"), Some("1 Main St"), Some(12))
        .unwrap()
        .into_property(tenant, Utc::now())
}

/// Cached read vs. straight repository read for a warm key.
fn bench_read_through(c: &mut Criterion) {
    let rt = runtime();
    let repo = Arc::new(InMemoryPropertyRepository::new());
    let cache = CacheService::new(Arc::new(InMemoryCacheStore::new()), KeyMapper::default());
    let tenant = TenantId::new();
    let p = property(tenant, 0);
    rt.block_on(repo.insert(&p)).unwrap();
    let key = cache.keys().entity(CacheEntity::Property, tenant, p.id);
    let ttl = CacheEntity::Property.default_ttl();

    let mut group = c.benchmark_group("read_through");
    group.throughput(Throughput::Elements(1));

    group.bench_function("cache_hit", |b| {
        rt.block_on(cache.set(&key, &p, ttl));
        b.iter(|| {
            let got = rt.block_on(cache.get_or_load(&key, ttl, || async {
                repo.get(tenant, p.id).await
            }));
            black_box(got).unwrap();
        })
    });

    group.bench_function("repository_direct", |b| {
        b.iter(|| black_box(rt.block_on(repo.get(tenant, p.id))).unwrap())
    });

    group.bench_function("miss_then_fill", |b| {
        b.iter(|| {
            rt.block_on(cache.invalidate(std::slice::from_ref(&key)));
            let got = rt.block_on(cache.get_or_load(&key, ttl, || async {
                repo.get(tenant, p.id).await
            }));
            black_box(got).unwrap();
        })
    });

    group.finish();
}

/// Cost of invalidating a document write as the number of cached lists grows.
fn bench_invalidation(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("invalidation");

    for scopes in [1usize, 8, 64] {
        let cache = CacheService::new(Arc::new(InMemoryCacheStore::new()), KeyMapper::default());
        let tenant = TenantId::new();
        let id = EntityId::new();
        let extra: Vec<String> = (0..scopes).map(|i| format!("property_{i}")).collect();
        let keys = cache.keys().invalidation_set(CacheEntity::Document, tenant, id, &extra);

        group.throughput(Throughput::Elements(keys.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(scopes), &keys, |b, keys| {
            b.iter(|| {
                for k in keys {
                    rt.block_on(cache.set(k, &"cached", Duration::from_secs(60)));
                }
                rt.block_on(cache.invalidate(black_box(keys)));
            })
        });
    }

    group.finish();
}

/// Tenant-wide flush against a populated store.
fn bench_tenant_flush(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("tenant_flush");

    for entries in [100usize, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(entries), &entries, |b, &entries| {
            let cache = CacheService::new(Arc::new(InMemoryCacheStore::new()), KeyMapper::default());
            let tenant = TenantId::new();
            let other = TenantId::new();
            b.iter(|| {
                for _ in 0..entries {
                    let k = cache.keys().entity(CacheEntity::Property, tenant, EntityId::new());
                    rt.block_on(cache.set(&k, &1u8, Duration::from_secs(60)));
                }
                let k = cache.keys().entity(CacheEntity::Property, other, EntityId::new());
                rt.block_on(cache.set(&k, &1u8, Duration::from_secs(60)));
                rt.block_on(cache.invalidate_tenant(black_box(tenant)));
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_read_through, bench_invalidation, bench_tenant_flush);
criterion_main!(benches);
