use common::{Money, OrderId, ShopId};
use criterion::{Criterion, criterion_group, criterion_main};
use ledger::{HoldItem, InMemoryStockLedger, NewProduct, ProductCatalog, StockLedger};

fn bench_hold_and_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("ledger/hold_release_single_product", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = InMemoryStockLedger::new();
                let product = ledger
                    .create_product(NewProduct::new(
                        ShopId::new(1),
                        "Widget",
                        Money::from_cents(100),
                        100,
                    ))
                    .await
                    .unwrap();
                ledger
                    .hold_bulk(OrderId::new(1), &[HoldItem::new(product.id, 5)])
                    .await
                    .unwrap();
                ledger.release_bulk(OrderId::new(1)).await.unwrap();
            });
        });
    });
}

fn bench_contended_holds(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("ledger/contended_holds_64_orders", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = InMemoryStockLedger::new();
                let product = ledger
                    .create_product(NewProduct::new(
                        ShopId::new(1),
                        "Hot item",
                        Money::from_cents(100),
                        32,
                    ))
                    .await
                    .unwrap();

                let mut handles = Vec::with_capacity(64);
                for order in 1..=64 {
                    let ledger = ledger.clone();
                    handles.push(tokio::spawn(async move {
                        let _ = ledger
                            .hold_bulk(OrderId::new(order), &[HoldItem::new(product.id, 1)])
                            .await;
                    }));
                }
                for handle in handles {
                    handle.await.unwrap();
                }
            });
        });
    });
}

criterion_group!(benches, bench_hold_and_release, bench_contended_holds);
criterion_main!(benches);
