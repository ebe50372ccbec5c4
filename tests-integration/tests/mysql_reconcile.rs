//! Reconciliation passes against a real MySQL server.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use common::ddl::Identifier;
use reconciler::{Reconciler, ReconcilerConfig, TableOutcome, inventory};
use tests_integration::{MySqlTestContext, SCHEMA};

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, 15, 30, 0).unwrap()
}

fn reconciler(ctx: &MySqlTestContext) -> Result<Reconciler> {
    let config = ReconcilerConfig::new(Identifier::new(SCHEMA)?, Duration::from_secs(30))?;
    let reconciler = Reconciler::new(ctx.catalog.clone(), ctx.catalog.clone(), config)?;
    Ok(reconciler.with_clock(fixed_now))
}

async fn partition_names(ctx: &MySqlTestContext, name: &str) -> Result<Vec<String>> {
    let state = inventory::load(&*ctx.catalog, &ctx.table(name)?).await?;
    Ok(state.partitions.into_iter().map(|p| p.name).collect())
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_numeric_table_lead_and_retention() -> Result<()> {
    let ctx = MySqlTestContext::new().await?;
    ctx.create_range_table(
        "orders",
        "[rk:p{n}:1000:2:3]",
        &[("p1000", 1000), ("p2000", 2000)],
    )
    .await?;
    ctx.insert_ids("orders", &[5, 1500]).await?;
    let reconciler = reconciler(&ctx)?;

    let report = reconciler.run_cycle().await;
    assert_eq!(report.failed_tables(), 0);
    assert_eq!(report.partitions_added(), 2);
    assert_eq!(
        partition_names(&ctx, "orders").await?,
        vec!["p1000", "p2000", "p3000", "p4000"]
    );

    // Four partitions against a retention of three.
    let report = reconciler.run_cycle().await;
    assert_eq!(report.partitions_added(), 0);
    assert_eq!(report.partitions_dropped(), 1);

    let report = reconciler.run_cycle().await;
    assert!(matches!(report.tables[0].outcome, TableOutcome::InSync));

    ctx.insert_ids("orders", &[3500]).await?;
    let report = reconciler.run_cycle().await;
    assert_eq!(report.partitions_added(), 2);
    assert_eq!(report.partitions_dropped(), 0);
    assert_eq!(
        partition_names(&ctx, "orders").await?,
        vec!["p2000", "p3000", "p4000", "p5000", "p6000"]
    );
    Ok(())
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_daily_boundaries_match_to_days() -> Result<()> {
    let ctx = MySqlTestContext::new().await?;
    ctx.create_daily_table(
        "events",
        "[rk:p{%Y%m%d}:1d:2:30]",
        &[("p20240314", "2024-03-14")],
    )
    .await?;
    let reconciler = reconciler(&ctx)?;

    let report = reconciler.run_cycle().await;
    assert_eq!(report.failed_tables(), 0);
    assert_eq!(
        partition_names(&ctx, "events").await?,
        vec!["p20240314", "p20240315", "p20240316", "p20240317"]
    );

    // Each boundary is the server's own TO_DAYS value for the named day.
    let row: (i64,) = sqlx::query_as(
        "SELECT CAST(PARTITION_DESCRIPTION AS SIGNED) - TO_DAYS('2024-03-17') \
         FROM information_schema.PARTITIONS \
         WHERE TABLE_SCHEMA = ? AND TABLE_NAME = 'events' AND PARTITION_NAME = 'p20240317'",
    )
    .bind(SCHEMA)
    .fetch_one(ctx.catalog.pool())
    .await?;
    assert_eq!(row.0, 0);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_force_drop_uses_one_statement() -> Result<()> {
    let ctx = MySqlTestContext::new().await?;
    ctx.create_range_table(
        "logs",
        "[rk:p{n}:10:1:2:f]",
        &[("p10", 10), ("p20", 20), ("p30", 30), ("p40", 40), ("p50", 50)],
    )
    .await?;
    ctx.insert_ids("logs", &[45]).await?;
    let reconciler = reconciler(&ctx)?;

    let report = reconciler.run_cycle().await;
    let TableOutcome::Applied(mutation) = &report.tables[0].outcome else {
        panic!("expected changes, got {:?}", report.tables[0].outcome);
    };
    assert_eq!(mutation.partitions_added(), 1);
    assert_eq!(mutation.partitions_dropped(), 3);
    assert_eq!(mutation.changes.len(), 2);
    assert_eq!(
        partition_names(&ctx, "logs").await?,
        vec!["p40", "p50", "p60"]
    );
    Ok(())
}
