//! Virtual tables: several physical sources merged under one schema

use std::sync::Arc;

use ferry_core::{DataTable, Extraction, FerryError, Result};

use crate::dialect::DependencyFetcher;

/// Fetch every dependency in turn and merge them into the template's schema.
///
/// Dependencies are fetched sequentially to bound load on the sources.
/// Individual failures are logged and skipped; the call fails only when no
/// dependency is the template or none could be fetched.
pub(crate) async fn parallel_select(
    dependencies: &[Arc<Extraction>],
    fetcher: &dyn DependencyFetcher,
) -> Result<DataTable> {
    let group_name = dependencies
        .first()
        .map(|d| d.table_alias().to_string())
        .unwrap_or_default();
    let template_idx = dependencies
        .iter()
        .position(|d| d.is_virtual_template)
        .ok_or_else(|| FerryError::MissingTemplate(group_name.clone()))?;

    // Template first, so its schema is known before anything is merged
    let order = std::iter::once(template_idx)
        .chain((0..dependencies.len()).filter(|idx| *idx != template_idx));

    let mut fetched: Vec<DataTable> = Vec::with_capacity(dependencies.len());
    let mut template: Option<DataTable> = None;
    let mut failures: Vec<String> = Vec::new();

    for idx in order {
        let dependency = &dependencies[idx];
        match fetcher.fetch(dependency).await {
            Ok(table) if idx == template_idx => template = Some(table),
            Ok(table) => fetched.push(table),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    extraction_id = dependency.id,
                    virtual_id = dependency.virtual_id.as_deref().unwrap_or_default(),
                    error = %e,
                    "virtual dependency fetch failed"
                );
                failures.push(format!("{}: {}", dependency.name, e));
            }
        }
    }

    let template = match template {
        Some(template) => template,
        None if !fetched.is_empty() => {
            tracing::warn!(table = %group_name, "template fetch failed; using first dependency's schema");
            fetched.remove(0)
        }
        None => {
            return Err(FerryError::Query(format!(
                "no dependency of virtual table '{}' could be fetched: {}",
                group_name,
                failures.join("; ")
            )));
        }
    };

    let mut merged = template.clone_schema();
    merged.make_all_nullable();
    let mut is_last = template.page.is_last;
    merged.merge(template);
    for table in fetched {
        is_last &= table.page.is_last;
        merged.merge(table);
    }
    merged.page.is_last = is_last;

    tracing::debug!(
        table = %group_name,
        rows = merged.row_count(),
        failed = failures.len(),
        "virtual table merged"
    );
    Ok(merged)
}
