//! # Seed Data Generator
//!
//! Populates a development ledger through the public API, so every row
//! goes through the same validation, stock rules and events as real use.
//!
//! ## Usage
//! ```bash
//! # Seed ./tally_dev.db with 14 days of sales (default)
//! cargo run -p tally-db --bin seed
//!
//! # Custom history length
//! cargo run -p tally-db --bin seed -- --days 60
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//! ```
//!
//! ## Generated Data
//! - One category per entry in [`CATALOG`] with its products
//! - An opening purchase per supplier stocking every product
//! - A few sales per day, some of them to registered customers

use chrono::{Duration, Utc};
use std::env;
use tally_core::{Money, NewProduct, PurchaseLine, Quantity, SaleLine};
use tally_db::{LedgerConfig, LedgerStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Categories with `(name, cost, sell price)` per product.
const CATALOG: &[(&str, &[(&str, i64, i64)])] = &[
    (
        "Beverages",
        &[
            ("Cola 1.5L", 180, 250),
            ("Mineral Water", 60, 100),
            ("Orange Juice", 220, 320),
            ("Iced Tea", 150, 220),
        ],
    ),
    (
        "Bakery",
        &[
            ("Baguette", 70, 120),
            ("Croissant", 90, 160),
            ("Rye Bread", 130, 210),
        ],
    ),
    (
        "Dairy",
        &[
            ("Whole Milk", 110, 160),
            ("Greek Yogurt", 140, 230),
            ("Cheddar Cheese", 420, 650),
            ("Butter", 260, 380),
        ],
    ),
    (
        "Bulk",
        &[
            ("Rice (kg)", 150, 240),
            ("Lentils (kg)", 210, 330),
            ("Coffee Beans (kg)", 1800, 2600),
        ],
    ),
];

const SUPPLIERS: &[&str] = &["Northwind Wholesale", "Contoso Foods"];

const CUSTOMERS: &[(&str, &str)] = &[
    ("100000001", "Ana Ferreira"),
    ("100000002", "Rui Costa"),
    ("100000003", "Marta Lopes"),
];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tally=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut days: i64 = 14;
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--days" | "-n" => {
                if i + 1 < args.len() {
                    days = args[i + 1].parse().unwrap_or(14);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -n, --days <N>     Days of sales history to generate (default: 14)");
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, days, "Seeding ledger");

    let config = LedgerConfig::with_database_path(&db_path);
    let store = LedgerStore::open(&config).await?;

    let existing = store.catalog().list_products().await?;
    if !existing.is_empty() {
        warn!(
            products = existing.len(),
            "Database already has products; delete the file to regenerate"
        );
        return Ok(());
    }

    // Catalog
    let mut products = Vec::new();
    for (category_name, items) in CATALOG {
        let category = store.catalog().create_category(category_name).await?;
        for (name, cost, sell) in items.iter() {
            let product = store
                .catalog()
                .create_product(NewProduct {
                    name: name.to_string(),
                    category_id: Some(category.id),
                    cost_price: Money::from_units(*cost),
                    sell_price: Money::from_units(*sell),
                })
                .await?;
            products.push(product);
        }
    }
    info!(count = products.len(), "Products created");

    let mut customers = Vec::new();
    for (identifier, name) in CUSTOMERS {
        customers.push(store.catalog().create_customer(identifier, name).await?.id);
    }

    // Opening stock, split between suppliers
    let opened = Utc::now() - Duration::days(days + 1);
    for (index, supplier) in SUPPLIERS.iter().enumerate() {
        let lines: Vec<PurchaseLine> = products
            .iter()
            .enumerate()
            .filter(|(n, _)| n % SUPPLIERS.len() == index)
            .map(|(n, product)| -> Result<PurchaseLine, Box<dyn std::error::Error>> {
                Ok(PurchaseLine {
                    product_id: product.id,
                    quantity: Quantity::from_units(200 + (n as i64 * 37) % 300)?,
                    price: product.cost_price,
                })
            })
            .collect::<Result<_, _>>()?;
        store.purchases().create(supplier, opened, &lines).await?;
    }
    info!(suppliers = SUPPLIERS.len(), "Opening purchases recorded");

    // Sales history
    let start = std::time::Instant::now();
    let mut sales = 0;
    for day in 0..days {
        let date = opened + Duration::days(day + 1);
        for slot in 0..(3 + day % 4) {
            let seed = (day * 7 + slot) as usize;
            let customer = (seed % 3 != 0).then(|| customers[seed % customers.len()]);
            let lines: Vec<SaleLine> = (0..1 + seed % 3)
                .map(|k| {
                    let product = &products[(seed * 5 + k * 3) % products.len()];
                    // bulk items sell by weight
                    let quantity = if product.name.contains("(kg)") {
                        format!("{}.{:03}", 1 + k, (seed * 125) % 1000)
                    } else {
                        format!("{}", 1 + (seed + k) % 4)
                    };
                    (product, quantity)
                })
                .map(|(product, quantity)| -> Result<SaleLine, Box<dyn std::error::Error>> {
                    Ok(SaleLine {
                        product_id: product.id,
                        quantity: quantity.parse()?,
                        price: product.sell_price,
                    })
                })
                .collect::<Result<_, _>>()?;

            let date = date + Duration::minutes(slot * 45);
            match store.sales().create(customer, date, &lines).await {
                Ok(_) => sales += 1,
                Err(e) if e.is_expected() => warn!(error = %e, "Skipped sale"),
                Err(e) => return Err(e.into()),
            }
        }
    }
    info!(sales, elapsed = ?start.elapsed(), "Sales recorded");

    let today = Utc::now().date_naive();
    let summary = store
        .analytics()
        .sales_summary(today - Duration::days(days + 1), today)
        .await?;
    println!();
    println!("✓ Seed complete!");
    println!("  Sales:   {}", summary.sale_count);
    println!("  Revenue: {}", summary.total_amount);
    println!("  Profit:  {}", summary.total_profit);

    store.close().await;
    Ok(())
}
