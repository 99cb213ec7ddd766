use chrono::{Duration, Utc};
use common::{CategoryId, ProductId, SessionId, ShippingMethodId, ShippingZoneId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::checkout::{Checkout, CheckoutItem, Owner};
use domain::discount::{
    Discount, DiscountKind, DiscountMethod, DiscountRule, DiscountTargets, ValidityWindow,
};
use domain::shipping::ShippingRate;
use domain::{CurrencyCode, Money, Percent, Weight};
use std::hint::black_box;

fn checkout_with_items(lines: i64) -> Checkout {
    let now = Utc::now();
    let mut checkout = Checkout::new(
        Owner::Guest(SessionId::new("bench")),
        CurrencyCode::default(),
        Duration::hours(24),
        now,
    )
    .unwrap();
    for product in 1..=lines {
        let item = CheckoutItem::new(ProductId::new(product), 2, Money::from_minor(1250))
            .with_weight(Weight::from_grams(300));
        checkout.add_item(item, now).unwrap();
    }
    checkout
}

fn percent_discount(kind: DiscountKind) -> Discount {
    let now = Utc::now();
    let rule = DiscountRule::new(
        kind,
        DiscountMethod::Percentage(Percent::from_whole(15).unwrap()),
    )
    .unwrap();
    let window = ValidityWindow::new(now - Duration::days(1), now + Duration::days(30)).unwrap();
    Discount::new("BENCH15", rule, window).unwrap()
}

fn bench_basket_discount(c: &mut Criterion) {
    let checkout = checkout_with_items(20);
    let discount = percent_discount(DiscountKind::Basket);
    let targets = DiscountTargets::none();
    let now = Utc::now();

    c.bench_function("pricing/basket_discount", |b| {
        b.iter(|| black_box(discount.calculate(&checkout, &targets, now)));
    });
}

fn bench_product_discount(c: &mut Criterion) {
    let checkout = checkout_with_items(20);
    let discount = percent_discount(DiscountKind::product(
        (1..=10).map(ProductId::new),
        Vec::<CategoryId>::new(),
    ));
    let targets = DiscountTargets::new((11..=15).map(ProductId::new));
    let now = Utc::now();

    c.bench_function("pricing/product_discount", |b| {
        b.iter(|| black_box(discount.calculate(&checkout, &targets, now)));
    });
}

fn bench_tiered_shipping(c: &mut Criterion) {
    let rate = ShippingRate::new(
        ShippingMethodId::new(1),
        ShippingZoneId::new(1),
        Money::from_minor(500),
    )
    .unwrap()
    .with_weight_tier(Weight::from_grams(0), Weight::from_grams(1000), Money::from_minor(200))
    .unwrap()
    .with_weight_tier(Weight::from_grams(1001), Weight::from_grams(5000), Money::from_minor(800))
    .unwrap()
    .with_value_tier(Money::from_minor(0), Money::from_minor(5000), Money::from_minor(100))
    .unwrap();

    c.bench_function("pricing/tiered_shipping", |b| {
        b.iter(|| black_box(rate.cost(Money::from_minor(4200), Weight::from_grams(3000))));
    });
}

fn bench_recalculate_totals(c: &mut Criterion) {
    let mut checkout = checkout_with_items(50);

    c.bench_function("pricing/recalculate_totals", |b| {
        b.iter(|| {
            checkout.recalculate_totals();
            black_box(checkout.final_amount())
        });
    });
}

criterion_group!(
    benches,
    bench_basket_discount,
    bench_product_discount,
    bench_tiered_shipping,
    bench_recalculate_totals
);
criterion_main!(benches);
