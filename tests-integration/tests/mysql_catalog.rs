//! Catalog and schema writer against a real MySQL server.

use anyhow::Result;
use common::catalog::{Catalog, CatalogError, SchemaWriter, TableFilter};
use common::ddl::{DdlStatement, Identifier, PartitionDefinition};
use reconciler::BoundaryValue;
use reconciler::inventory;
use reconciler::policy::MARKER;
use tests_integration::{MySqlTestContext, SCHEMA};

#[tokio::test]
#[ignore] // Requires Docker
async fn test_inventory_of_partitioned_table() -> Result<()> {
    let ctx = MySqlTestContext::new().await?;
    let orders = ctx
        .create_range_table(
            "orders",
            "orders [rk:p{n}:1000:2:3]",
            &[("p2000", 2000), ("p1000", 1000), ("p3000", 3000)],
        )
        .await;
    // MySQL insists on ascending bounds in CREATE TABLE.
    assert!(orders.is_err());

    let orders = ctx
        .create_range_table(
            "orders",
            "orders [rk:p{n}:1000:2:3]",
            &[("p1000", 1000), ("p2000", 2000), ("p3000", 3000)],
        )
        .await?;
    ctx.insert_ids("orders", &[1, 2, 1500]).await?;

    // Before ANALYZE the estimates may still read 0; the live check does not.
    let state = inventory::load(&*ctx.catalog, &orders).await?;
    let checked: Vec<_> = state.partitions.iter().map(|p| p.holds_rows).collect();
    assert_eq!(checked, vec![None, Some(true), Some(false)]);

    ctx.analyze("orders").await?;
    let state = inventory::load(&*ctx.catalog, &orders).await?;
    assert!(state.exists);
    assert!(state.partitioned);
    assert!(state.policy.is_some());

    let names: Vec<_> = state.partitions.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["p1000", "p2000", "p3000"]);
    assert_eq!(state.max_boundary(), Some(BoundaryValue::Value(3000)));
    assert!(state.partitions[0].row_estimate > 0);
    assert_eq!(state.partitions[2].row_estimate, 0);
    assert_eq!(state.partitions[0].expression.as_deref(), Some("`id`"));
    Ok(())
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_partition_has_rows() -> Result<()> {
    let ctx = MySqlTestContext::new().await?;
    let orders = ctx
        .create_range_table("orders", "orders", &[("p1000", 1000), ("p2000", 2000)])
        .await?;
    ctx.insert_ids("orders", &[1500]).await?;

    let p1000 = Identifier::new("p1000")?;
    let p2000 = Identifier::new("p2000")?;
    assert!(!ctx.catalog.partition_has_rows(&orders, &p1000).await?);
    assert!(ctx.catalog.partition_has_rows(&orders, &p2000).await?);

    let unknown = Identifier::new("p9000")?;
    let missing = ctx.catalog.partition_has_rows(&orders, &unknown).await;
    assert!(missing.is_err());
    Ok(())
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_inventory_of_plain_and_missing_tables() -> Result<()> {
    let ctx = MySqlTestContext::new().await?;
    ctx.execute("CREATE TABLE `users` (id BIGINT PRIMARY KEY) COMMENT = '[rk:p{n}:10:1:1]'")
        .await?;

    let users = inventory::load(&*ctx.catalog, &ctx.table("users")?).await?;
    assert!(users.exists);
    assert!(!users.partitioned);
    assert!(users.policy.is_none());

    let missing = inventory::load(&*ctx.catalog, &ctx.table("nope")?).await?;
    assert!(!missing.exists);
    assert!(missing.partitions.is_empty());
    Ok(())
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_listing_and_comment_update() -> Result<()> {
    let ctx = MySqlTestContext::new().await?;
    let events = ctx
        .create_range_table("events", "", &[("p100", 100)])
        .await?;
    ctx.execute("CREATE TABLE `users` (id BIGINT PRIMARY KEY) COMMENT = 'accounts'")
        .await?;

    let schema = Identifier::new(SCHEMA)?;
    let managed = TableFilter::CommentContains(MARKER.to_string());
    assert!(ctx.catalog.list_tables(&schema, &managed).await?.is_empty());

    let statement = DdlStatement::set_comment(events.clone(), "events [rk:p{n}:100:2:5]")?;
    ctx.catalog.execute(&statement).await?;

    let listed = ctx.catalog.list_tables(&schema, &managed).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "events");
    assert!(listed[0].partitioned);

    let all = ctx.catalog.list_tables(&schema, &TableFilter::All).await?;
    assert_eq!(all.len(), 2);

    let definition = ctx
        .catalog
        .show_create_table(&events)
        .await?
        .unwrap_or_default();
    assert!(definition.contains("[rk:p{n}:100:2:5]"));
    Ok(())
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_server_rejects_out_of_order_add() -> Result<()> {
    let ctx = MySqlTestContext::new().await?;
    let orders = ctx
        .create_range_table("orders", "", &[("p1000", 1000), ("p2000", 2000)])
        .await?;

    let statement = DdlStatement::add_partitions(
        orders.clone(),
        vec![PartitionDefinition::new(Identifier::new("p1500")?, 1500)],
    )?;
    let err = ctx.catalog.execute(&statement).await.unwrap_err();
    assert!(matches!(err, CatalogError::Rejected(_)), "{err}");

    let drop = DdlStatement::drop_partitions(
        orders.clone(),
        vec![Identifier::new("p1000")?, Identifier::new("p2000")?],
    )?;
    // The last partition of a table can never be dropped.
    assert!(ctx.catalog.execute(&drop).await.is_err());
    Ok(())
}
