//! Catalog and price override commands

use anyhow::Result;
use std::future::Future;
use tabled::Tabled;

use crate::client::{
    ApiClient, CatalogEntry, LabelList, OverrideResponse, PriceRecord, ScanControlResponse,
};
use crate::commands::scan::{PAUSE_PATH, RESUME_PATH};
use crate::output::{print_info, print_json, print_success, print_table, print_warning, OutputFormat};

/// Row for the labels table
#[derive(Tabled)]
struct LabelRow {
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Source")]
    layer: String,
}

impl From<&CatalogEntry> for LabelRow {
    fn from(entry: &CatalogEntry) -> Self {
        let record = entry.record.as_ref();
        Self {
            label: entry.label.clone(),
            name: record.map(|r| r.display_name.clone()).unwrap_or_else(|| "-".to_string()),
            price: record.map(|r| r.price.clone()).unwrap_or_else(|| "-".to_string()),
            category: record
                .and_then(|r| r.category.clone())
                .unwrap_or_else(|| "-".to_string()),
            layer: entry.layer.clone().unwrap_or_else(|| "unmapped".to_string()),
        }
    }
}

fn override_path(label: &str) -> [&str; 4] {
    ["api", "v1", "overrides", label]
}

/// List the labels the classifier knows, with their effective records
pub async fn list_labels(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let list: LabelList = client.get(&["api", "v1", "labels"]).await?;

    if let OutputFormat::Json = format {
        return print_json(&list);
    }

    if !list.classifier_ready {
        print_warning("Classifier is not loaded yet; no labels available");
        return Ok(());
    }

    let rows: Vec<LabelRow> = list.labels.iter().map(LabelRow::from).collect();
    print_table(&rows);
    Ok(())
}

/// Show the effective record for one label
pub async fn get_label(client: &ApiClient, label: &str, format: OutputFormat) -> Result<()> {
    let entry: CatalogEntry = client.get(&["api", "v1", "catalog", label]).await?;

    match format {
        OutputFormat::Json => print_json(&entry)?,
        OutputFormat::Table => print_table(&[LabelRow::from(&entry)]),
    }
    Ok(())
}

/// Run a settings change with scanning paused, resuming only if this
/// command was the one that paused it
async fn with_scan_paused<T, F>(client: &ApiClient, action: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let paused: ScanControlResponse = client.post(PAUSE_PATH).await?;
    let result = action.await;

    if paused.changed {
        let resumed: Result<ScanControlResponse> = client.post(RESUME_PATH).await;
        if let Err(e) = resumed {
            print_warning(&format!("Failed to resume scanning: {}", e));
        }
    }

    result
}

/// Set a price override for a label
pub async fn set_override(
    client: &ApiClient,
    label: &str,
    record: PriceRecord,
    format: OutputFormat,
) -> Result<()> {
    let path = override_path(label);
    let response: OverrideResponse =
        with_scan_paused(client, client.put(&path, &record)).await?;
    report_override(&response, "saved", format)
}

/// Remove a label's override so its default record applies again
pub async fn reset_override(client: &ApiClient, label: &str, format: OutputFormat) -> Result<()> {
    let path = override_path(label);
    let response: OverrideResponse = with_scan_paused(client, client.delete(&path)).await?;
    report_override(&response, "reset", format)
}

fn report_override(response: &OverrideResponse, verb: &str, format: OutputFormat) -> Result<()> {
    if let OutputFormat::Json = format {
        return print_json(response);
    }

    if response.persisted {
        print_success(&format!("Override for '{}' {}", response.label, verb));
    } else {
        print_warning(&format!(
            "Override for '{}' applied but not saved: {}",
            response.label,
            response.error.as_deref().unwrap_or("unknown storage error")
        ));
    }

    match &response.record {
        Some(record) => print_info(&format!(
            "Now showing {} at {}",
            record.display_name, record.price
        )),
        None => print_info("Label has no record; the generic price will be shown"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn control_body(changed: bool, paused: bool) -> String {
        format!(
            r#"{{"changed":{},"status":{{"state":"{}","paused":{},"tickCount":10,"generation":8}}}}"#,
            changed,
            if paused { "suspended" } else { "running" },
            paused
        )
    }

    #[tokio::test]
    async fn test_set_pauses_and_resumes() {
        let mut server = mockito::Server::new_async().await;
        let pause = server
            .mock("POST", "/api/v1/scan/pause")
            .with_status(200)
            .with_body(control_body(true, true))
            .expect(1)
            .create_async()
            .await;
        let put = server
            .mock("PUT", Matcher::Regex(r"^/api/v1/overrides/Class.*1$".to_string()))
            .match_body(Matcher::PartialJsonString(
                r#"{"displayName":"Generic Item","price":"₦60"}"#.to_string(),
            ))
            .with_status(200)
            .with_body(
                r#"{"label":"Class 1","record":{"displayName":"Generic Item","price":"₦60"},"persisted":true}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let resume = server
            .mock("POST", "/api/v1/scan/resume")
            .with_status(200)
            .with_body(control_body(true, false))
            .expect(1)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let record = PriceRecord {
            display_name: "Generic Item".to_string(),
            price: "₦60".to_string(),
            category: None,
        };
        set_override(&client, "Class 1", record, OutputFormat::Json)
            .await
            .unwrap();

        pause.assert_async().await;
        put.assert_async().await;
        resume.assert_async().await;
    }

    #[tokio::test]
    async fn test_reset_leaves_operator_pause_alone() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/scan/pause")
            .with_status(200)
            .with_body(control_body(false, true))
            .create_async()
            .await;
        server
            .mock("DELETE", "/api/v1/overrides/Hollandia%2050g")
            .with_status(200)
            .with_body(
                r#"{"label":"Hollandia 50g","record":{"displayName":"Hollandia Evaporated Milk (50g)","price":"₦250"},"persisted":true}"#,
            )
            .create_async()
            .await;
        let resume = server
            .mock("POST", "/api/v1/scan/resume")
            .expect(0)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        reset_override(&client, "Hollandia 50g", OutputFormat::Json)
            .await
            .unwrap();

        resume.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_change_still_resumes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/scan/pause")
            .with_status(200)
            .with_body(control_body(true, true))
            .create_async()
            .await;
        server
            .mock("DELETE", "/api/v1/overrides/Unknown")
            .with_status(404)
            .with_body(r#"{"error":"No override for label 'Unknown'"}"#)
            .create_async()
            .await;
        let resume = server
            .mock("POST", "/api/v1/scan/resume")
            .with_status(200)
            .with_body(control_body(true, false))
            .expect(1)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let result = reset_override(&client, "Unknown", OutputFormat::Json).await;

        assert!(result.is_err());
        resume.assert_async().await;
    }

    #[test]
    fn test_label_row_for_unmapped_entry() {
        let entry = CatalogEntry {
            label: "Class 7".to_string(),
            record: None,
            layer: None,
        };

        let row = LabelRow::from(&entry);

        assert_eq!(row.price, "-");
        assert_eq!(row.layer, "unmapped");
    }
}
