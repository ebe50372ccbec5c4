use anyhow::Context;
use clap::Args;
use serde::Serialize;

use common::catalog::{Catalog, TableFilter, TableSummary};
use common::ddl::Identifier;
use reconciler::PartitionPolicy;
use reconciler::policy::{self, MARKER};

use super::output::{self, Output};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Schema to list
    pub schema: Identifier,
    /// Only tables with a comment
    #[arg(long, conflicts_with = "managed")]
    pub comment: bool,
    /// Only tables whose comment carries a partitioning policy
    #[arg(long)]
    pub managed: bool,
    /// Only partitioned tables
    #[arg(long)]
    pub partitioned: bool,
    /// Show the decoded policy of each table
    #[arg(short, long)]
    pub definition: bool,
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct TableListing {
    #[serde(flatten)]
    summary: TableSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<PartitionPolicy>,
}

impl ShowArgs {
    fn filter(&self) -> TableFilter {
        if self.managed {
            TableFilter::CommentContains(MARKER.to_string())
        } else if self.comment {
            TableFilter::Commented
        } else {
            TableFilter::All
        }
    }

    pub async fn run(self, catalog: &dyn Catalog) -> anyhow::Result<()> {
        let tables = catalog
            .list_tables(&self.schema, &self.filter())
            .await
            .with_context(|| format!("Failed to list tables of {}", self.schema))?;

        let listings: Vec<TableListing> = tables
            .into_iter()
            .filter(|t| !self.partitioned || t.partitioned)
            .map(|summary| TableListing {
                policy: self
                    .definition
                    .then(|| policy::decode(&summary.comment))
                    .flatten(),
                summary,
            })
            .collect();

        Output::new(self.json)
            .emit(&listings, || self.render(&listings))
    }

    fn render(&self, listings: &[TableListing]) -> String {
        if listings.is_empty() {
            return format!("No tables found in {}", self.schema);
        }

        let mut headers = vec!["TABLE", "PARTITIONED", "COMMENT"];
        if self.definition {
            headers.push("POLICY");
        }

        let rows: Vec<Vec<String>> = listings
            .iter()
            .map(|listing| {
                let mut row = vec![
                    listing.summary.name.clone(),
                    if listing.summary.partitioned { "yes" } else { "no" }.to_string(),
                    listing.summary.comment.clone(),
                ];
                if self.definition {
                    row.push(
                        listing
                            .policy
                            .as_ref()
                            .map(output::describe_policy)
                            .unwrap_or_else(|| "-".to_string()),
                    );
                }
                row
            })
            .collect();

        output::render_table(&headers, &rows)
    }
}
