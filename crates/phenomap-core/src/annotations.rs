//! Gene-group annotations and upstream phenotypic-activity calls.

use std::collections::HashSet;
use std::path::Path;

use crate::delimited::read_table;
use crate::error::{Error, Result};
use crate::table::{Table, Value};

/// Separator between labels in an annotation cell.
pub const LABEL_SEPARATOR: char = '|';

/// Load `[id_col, annotation_col, multilabel_col]` from an annotation file.
///
/// Rows without an annotation are dropped. `multilabel_col` holds the
/// annotation split on [`LABEL_SEPARATOR`].
pub fn load_annotations(
    path: &Path,
    id_col: &str,
    annotation_col: &str,
    multilabel_col: &str,
) -> Result<Table> {
    let raw = read_table(path)?;
    let a = raw.column_index(annotation_col)?;
    let annotated = raw
        .filter_rows(|row| !row[a].is_missing())
        .select(&[id_col, annotation_col])?;

    let labels: Vec<Value> = annotated
        .rows()
        .map(|row| Value::labels(&row[1].to_string(), LABEL_SEPARATOR))
        .collect();
    let mut table = annotated;
    table.push_column(multilabel_col, labels)?;

    if table.is_empty() {
        return Err(Error::empty(format!("annotations in {}", path.display())));
    }
    log::info!(
        "loaded {} annotated rows from {}",
        table.n_rows(),
        path.display()
    );
    Ok(table)
}

fn is_true(value: &Value) -> bool {
    matches!(value.as_text(), Some("True" | "true" | "TRUE" | "1"))
}

/// Identifiers whose `below_corrected_p` flag is set in an activity table.
pub fn load_active_ids(path: &Path, id_col: &str) -> Result<HashSet<String>> {
    let table = read_table(path)?;
    let id = table.column_index(id_col)?;
    let flag = table.column_index("below_corrected_p")?;
    let active: HashSet<String> = table
        .rows()
        .filter(|row| is_true(&row[flag]))
        .filter_map(|row| row[id].as_text().map(str::to_string))
        .collect();
    log::info!(
        "{} of {} perturbations phenotypically active in {}",
        active.len(),
        table.n_rows(),
        path.display()
    );
    Ok(active)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_annotations_splits_labels() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("orf_metadata.tsv");
        std::fs::write(
            &path,
            "Metadata_JCP2022\tMetadata_Symbol\tMetadata_gene_group_id\n\
             JCP1\tTP53\t12|7|12\n\
             JCP2\tKRAS\t\n\
             JCP3\tBRAF\t7\n",
        )
        .unwrap();
        let t = load_annotations(
            &path,
            "Metadata_JCP2022",
            "Metadata_gene_group_id",
            "Metadata_gene_group_list",
        )
        .unwrap();
        assert_eq!(t.n_rows(), 2);
        assert_eq!(t.columns().len(), 3);
        assert_eq!(
            t.value(0, 2),
            &Value::Labels(vec!["12".to_string(), "7".to_string()])
        );
        assert_eq!(t.value(1, 0), &Value::from("JCP3"));
    }

    #[test]
    fn test_all_unannotated_is_empty_input() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.csv");
        std::fs::write(&path, "id,group\nx,\n").unwrap();
        let err = load_annotations(&path, "id", "group", "groups").unwrap_err();
        assert!(matches!(err, Error::EmptyInput { .. }));
    }

    #[test]
    fn test_load_active_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("phenotypic-activity-ORF.csv");
        std::fs::write(
            &path,
            "Metadata_JCP2022,mean_average_precision,below_corrected_p\n\
             JCP1,0.9,True\n\
             JCP2,0.1,False\n\
             JCP3,0.8,true\n",
        )
        .unwrap();
        let ids = load_active_ids(&path, "Metadata_JCP2022").unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("JCP1") && ids.contains("JCP3"));
    }
}
