//! Multi-pass reconciliation against the in-memory catalog.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use common::TableRef;
use common::ddl::{Identifier, SchemaChange};
use common::testing::{InMemoryCatalog, MemoryTable};
use ntest::timeout;
use reconciler::{Reconciler, ReconcilerConfig, ReconcilerState, TableOutcome};

fn table(name: &str) -> TableRef {
    TableRef::parse(&format!("shop.{name}")).unwrap()
}

fn config() -> ReconcilerConfig {
    ReconcilerConfig::new(Identifier::new("shop").unwrap(), Duration::from_secs(30))
        .unwrap()
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, 15, 30, 0).unwrap()
}

fn to_days(y: i32, m: u32, d: u32) -> i64 {
    i64::from(NaiveDate::from_ymd_opt(y, m, d).unwrap().num_days_from_ce()) + 365
}

fn reconciler(catalog: &Arc<InMemoryCatalog>) -> Reconciler {
    Reconciler::new(catalog.clone(), catalog.clone(), config())
        .unwrap()
        .with_clock(fixed_now)
}

#[tokio::test]
async fn test_stale_row_estimates_do_not_hide_data() {
    let orders = table("orders");
    let catalog = Arc::new(InMemoryCatalog::new().with_table(
        orders.clone(),
        MemoryTable::partitioned("orders [rk:p{n}:1000:2:3]")
            .partition("p1000", 1000, 0)
            .partition("p2000", 2000, 0),
    ));
    catalog.set_rows(&orders, "p2000", 40);
    catalog.set_estimate(&orders, "p2000", 0);

    let report = reconciler(&catalog).run_cycle().await;
    assert_eq!(report.partitions_added(), 2);
    assert_eq!(
        catalog.partition_names(&orders),
        vec!["p1000", "p2000", "p3000", "p4000"]
    );
}

#[tokio::test]
async fn test_numeric_table_follows_data() {
    let orders = table("orders");
    let catalog = Arc::new(InMemoryCatalog::new().with_table(
        orders.clone(),
        MemoryTable::partitioned("orders [rk:p{n}:1000:2:3]")
            .partition("p1000", 1000, 10)
            .partition("p2000", 2000, 0),
    ));
    let reconciler = reconciler(&catalog);

    // One empty partition ahead of p1000, one more needed.
    let report = reconciler.run_cycle().await;
    assert_eq!(report.partitions_added(), 1);
    assert_eq!(
        catalog.partition_names(&orders),
        vec!["p1000", "p2000", "p3000"]
    );

    // Nothing changed in between: no statements.
    let executed = catalog.executed().len();
    let report = reconciler.run_cycle().await;
    assert!(matches!(report.tables[0].outcome, TableOutcome::InSync));
    assert_eq!(catalog.executed().len(), executed);

    // Rows reach the top partition: two more ahead of it, in one statement.
    catalog.set_rows(&orders, "p3000", 5);
    let report = reconciler.run_cycle().await;
    assert_eq!(report.partitions_added(), 2);
    assert_eq!(report.partitions_dropped(), 0);
    assert_eq!(catalog.executed().len(), executed + 1);

    // The next pass retires everything beyond the newest three.
    let report = reconciler.run_cycle().await;
    assert_eq!(report.partitions_added(), 0);
    assert_eq!(report.partitions_dropped(), 2);
    assert_eq!(
        catalog.partition_names(&orders),
        vec!["p3000", "p4000", "p5000"]
    );

    let drops = catalog
        .executed()
        .into_iter()
        .filter(|s| matches!(s.change(), SchemaChange::DropPartitions(_)))
        .count();
    assert_eq!(drops, 2, "drops run one statement per partition");

    let metrics = reconciler.metrics().summary();
    assert_eq!(metrics.cycles, 4);
    assert_eq!(metrics.partitions_added, 3);
    assert_eq!(metrics.partitions_dropped, 2);
}

#[tokio::test]
async fn test_daily_table_catches_up_and_rotates() {
    let events = table("events");
    let catalog = Arc::new(InMemoryCatalog::new().with_table(
        events.clone(),
        MemoryTable::partitioned("[rk:p{%Y%m%d}:1d:2:3]")
            .with_expression("TO_DAYS(`created_at`)")
            .partition("p20240314", to_days(2024, 3, 14), 100),
    ));
    let reconciler = reconciler(&catalog);

    reconciler.run_cycle().await;
    assert_eq!(
        catalog.partition_names(&events),
        vec!["p20240314", "p20240315", "p20240316", "p20240317"]
    );

    let report = reconciler.run_cycle().await;
    assert_eq!(report.partitions_added(), 0);
    assert_eq!(report.partitions_dropped(), 1);
    assert_eq!(
        catalog.partition_names(&events),
        vec!["p20240315", "p20240316", "p20240317"]
    );
}

#[tokio::test]
async fn test_failing_table_does_not_stop_the_pass() {
    let broken = table("broken");
    let healthy = table("healthy");
    let catalog = Arc::new(
        InMemoryCatalog::new()
            .with_table(
                broken.clone(),
                MemoryTable::partitioned("[rk:p{n}:100:2:5]").partition("p100", 100, 1),
            )
            .with_table(
                healthy.clone(),
                MemoryTable::partitioned("[rk:p{n}:100:2:5]").partition("p100", 100, 1),
            )
            .with_table(table("unmanaged"), MemoryTable::plain("[rk:p{n}:100:2:5]"))
            .with_table(
                table("invalid"),
                MemoryTable::partitioned("[rk:p{n}:x:2:5]").partition("p1", 1, 0),
            ),
    );
    catalog.fail_statements(&broken);
    let reconciler = reconciler(&catalog);

    let report = reconciler.run_cycle().await;

    // The plain table is filtered out before loading.
    assert_eq!(report.tables.len(), 3);
    assert_eq!(report.failed_tables(), 1);
    assert_eq!(catalog.partition_names(&broken), vec!["p100"]);
    assert_eq!(catalog.partition_names(&healthy), vec!["p100", "p200", "p300"]);
    assert_eq!(reconciler.state(), ReconcilerState::Idle);
}

#[tokio::test]
async fn test_pass_survives_unavailable_catalog() {
    let orders = table("orders");
    let catalog = Arc::new(InMemoryCatalog::new().with_table(
        orders.clone(),
        MemoryTable::partitioned("[rk:p{n}:1000:1:3]").partition("p1000", 1000, 1),
    ));
    let reconciler = reconciler(&catalog);

    catalog.set_unavailable(true);
    let report = reconciler.run_cycle().await;
    assert!(report.scan_error.is_some());
    assert!(report.tables.is_empty());

    catalog.set_unavailable(false);
    let report = reconciler.run_cycle().await;
    assert!(report.scan_error.is_none());
    assert_eq!(catalog.partition_names(&orders), vec!["p1000", "p2000"]);
    assert_eq!(reconciler.metrics().scan_failures(), 1);
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let orders = table("orders");
    let catalog = Arc::new(InMemoryCatalog::new().with_table(
        orders.clone(),
        MemoryTable::partitioned("[rk:p{n}:1000:2:1]")
            .partition("p1000", 1000, 1)
            .partition("p2000", 2000, 1),
    ));
    let mut config = config();
    config.dry_run = true;
    let reconciler = Reconciler::new(catalog.clone(), catalog.clone(), config)
        .unwrap();

    let report = reconciler.run_cycle().await;

    assert_eq!(report.failed_tables(), 0);
    assert!(catalog.executed().is_empty());
    assert_eq!(catalog.partition_names(&orders), vec!["p1000", "p2000"]);
}

#[tokio::test]
#[timeout(10000)]
async fn test_daemon_runs_until_shutdown() {
    let orders = table("orders");
    let catalog = Arc::new(InMemoryCatalog::new().with_table(
        orders.clone(),
        MemoryTable::partitioned("[rk:p{n}:1000:1:3]").partition("p1000", 1000, 1),
    ));
    let reconciler = reconciler(&catalog);
    let mut states = reconciler.subscribe();

    reconciler.run(async {}).await;

    assert_eq!(reconciler.metrics().cycles(), 1);
    assert_eq!(catalog.partition_names(&orders), vec!["p1000", "p2000"]);
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), ReconcilerState::Idle);
}
