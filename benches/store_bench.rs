use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ledger::{AccountInput, AccountStore, AccountType, SqliteAccountStore, StoreOptions};
use rust_decimal::Decimal;
use tokio::runtime::Runtime;

fn setup(rt: &Runtime, accounts: usize) -> SqliteAccountStore {
    let store = SqliteAccountStore::open(StoreOptions::in_memory());
    rt.block_on(async {
        for i in 0..accounts {
            let input = AccountInput::new(format!("Account {i:04}"), AccountType::Checking, Decimal::new(i as i64 * 100, 2), "USD");
            store.create(&input).await.unwrap();
        }
    });
    store
}

fn bench_create(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = setup(&rt, 0);
    let input = AccountInput::new("Chase Checking", AccountType::Checking, Decimal::new(50000, 2), "USD");

    c.bench_function("create_account", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(store.create(&input).await.unwrap());
        })
    });
}

fn bench_list(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = setup(&rt, 500);

    c.bench_function("list_500_accounts", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(store.list().await.unwrap());
        })
    });
}

fn bench_ensure_ready(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = setup(&rt, 0);

    c.bench_function("ensure_ready_when_open", |b| {
        b.to_async(&rt).iter(|| async {
            store.connections().ensure_ready().await.unwrap();
        })
    });
}

criterion_group!(benches, bench_create, bench_list, bench_ensure_ready);
criterion_main!(benches);
