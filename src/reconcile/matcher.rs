use crate::error::RosterError;
use crate::helpers::string::identity_key;
use crate::helpers::string::COMPLETED;
use crate::table::Table;
use crate::table::Value;
use log::debug;
use log::info;
use std::collections::HashSet;

/// Column names the matcher reads and writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchColumns {
    /// First-name column of the master table
    pub master_first: String,
    /// Last-name column of the master table
    pub master_last: String,
    /// First-name column of the export table
    pub export_first: String,
    /// Last-name column of the export table
    pub export_last: String,
    /// Completion status column of the export table
    pub status: String,
    /// Master column that receives "Completed"
    pub training: String,
}

/// One planned write, as returned by [`Matcher::plan`].
#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    /// Zero-based master record that receives "Completed"
    pub row: usize,
    /// Training value before the write
    pub previous: Value,
}

impl Update {
    /// True when the write changes the stored value.
    pub fn changes_value(&self) -> bool {
        !matches!(&self.previous, Value::Text(text) if text == COMPLETED)
    }
}

/// Outcome of one matching pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// Master records whose identity key has a completed export record
    pub matched: usize,
    /// Matched records whose training value actually changed
    pub updated: usize,
    /// Total master records
    pub rows: usize,
}

/// Marks master records as completed when the export holds a completed record
/// for the same normalized first and last name.
#[derive(Clone, Debug)]
pub struct Matcher {
    columns: MatchColumns,
}

/// Resolved schema positions of [`MatchColumns`].
struct Positions {
    master_first: usize,
    master_last: usize,
    export_first: usize,
    export_last: usize,
    status: usize,
    training: usize,
}

impl Matcher {
    pub fn new(columns: MatchColumns) -> Matcher {
        Matcher { columns }
    }

    /// Resolves every configured column up front so a bad name fails before any write.
    fn resolve(&self, master: &Table, export: &Table) -> Result<Positions, RosterError> {
        Ok(Positions {
            master_first: master.require(&self.columns.master_first)?,
            master_last: master.require(&self.columns.master_last)?,
            training: master.require(&self.columns.training)?,
            export_first: export.require(&self.columns.export_first)?,
            export_last: export.require(&self.columns.export_last)?,
            status: export.require(&self.columns.status)?,
        })
    }

    /// Identity keys of export records whose status reads "completed".
    fn completed_keys(positions: &Positions, export: &Table) -> HashSet<String> {
        export
            .rows()
            .iter()
            .filter(|record| record[positions.status].is_completed())
            .map(|record| {
                identity_key(
                    &record[positions.export_first].to_string(),
                    &record[positions.export_last].to_string(),
                )
            })
            .collect()
    }

    /// Computes the writes without touching the master table.
    ///
    /// # Returns
    /// One [`Update`] per master record whose key is in the completed set, in row order
    pub fn plan(&self, master: &Table, export: &Table) -> Result<Vec<Update>, RosterError> {
        let positions = self.resolve(master, export)?;
        let keys = Self::completed_keys(&positions, export);
        debug!("{}: {} completed identities", export.name, keys.len());
        let updates = master
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                let key = identity_key(
                    &record[positions.master_first].to_string(),
                    &record[positions.master_last].to_string(),
                );
                keys.contains(&key)
            })
            .map(|(row, record)| Update {
                row,
                previous: record[positions.training].clone(),
            })
            .collect();
        Ok(updates)
    }

    /// Plans, then writes "Completed" into the training column of every matched record.
    ///
    /// The export is only read. Unmatched master records keep their values.
    pub fn apply(&self, master: &mut Table, export: &Table) -> Result<MatchReport, RosterError> {
        let updates = self.plan(master, export)?;
        let training = master.require(&self.columns.training)?;
        let mut report = MatchReport {
            matched: updates.len(),
            updated: 0,
            rows: master.len(),
        };
        for update in &updates {
            if update.changes_value() {
                report.updated += 1;
            }
            master.replace(update.row, training, Value::text(COMPLETED));
        }
        info!(
            "{}: {} of {} records matched, {} updated in '{}'",
            master.name, report.matched, report.rows, report.updated, self.columns.training
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::string::is_completed;
    use proptest::prelude::*;

    fn table(name: &str, columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            name,
            columns.iter().map(|column| column.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|cell| Value::from(*cell)).collect())
                .collect(),
        )
    }

    fn columns() -> MatchColumns {
        MatchColumns {
            master_first: "First".to_owned(),
            master_last: "Last".to_owned(),
            export_first: "Given".to_owned(),
            export_last: "Family".to_owned(),
            status: "Status".to_owned(),
            training: "Safety".to_owned(),
        }
    }

    fn export(rows: &[&[&str]]) -> Table {
        table("export", &["Given", "Family", "Status"], rows)
    }

    #[test]
    fn matches_on_normalized_names() {
        let mut master = table("master", &["First", "Last", "Safety"], &[
            &["Ana", "Lee", ""],
            &["Bo", "Wu", "Pending"],
            &["Cy", "Ng", "Pending"],
        ]);
        let export = export(&[
            &["  ANA ", "lee", "completed"],
            &["bo", "WU", " Completed\t"],
            &["Cy", "Ng", "In Progress"],
        ]);
        let report = Matcher::new(columns()).apply(&mut master, &export).unwrap();
        assert_eq!(report, MatchReport { matched: 2, updated: 2, rows: 3 });
        assert_eq!(master.cell(0, 2), &Value::text("Completed"));
        assert_eq!(master.cell(1, 2), &Value::text("Completed"));
        assert_eq!(master.cell(2, 2), &Value::text("Pending"));
    }

    #[test]
    fn duplicate_export_records_collapse() {
        let mut master = table("master", &["First", "Last", "Safety"], &[&["Ana", "Lee", ""]]);
        let export = export(&[
            &["Ana", "Lee", "Completed"],
            &["ana", "lee", "Completed"],
        ]);
        let report = Matcher::new(columns()).apply(&mut master, &export).unwrap();
        assert_eq!(report.matched, 1);
    }

    #[test]
    fn already_completed_is_matched_but_not_updated() {
        let mut master = table("master", &["First", "Last", "Safety"], &[
            &["Ana", "Lee", "Completed"],
            &["Bo", "Wu", "completed"],
        ]);
        let export = export(&[&["Ana", "Lee", "Completed"], &["Bo", "Wu", "Completed"]]);
        let report = Matcher::new(columns()).apply(&mut master, &export).unwrap();
        assert_eq!(report, MatchReport { matched: 2, updated: 1, rows: 2 });
        assert_eq!(master.cell(1, 2), &Value::text("Completed"));
    }

    #[test]
    fn rerun_updates_nothing() {
        let mut master = table("master", &["First", "Last", "Safety"], &[&["Ana", "Lee", ""], &["Bo", "Wu", ""]]);
        let export = export(&[&["Ana", "Lee", "Completed"]]);
        let matcher = Matcher::new(columns());
        assert_eq!(matcher.apply(&mut master, &export).unwrap().updated, 1);
        let first = master.clone();
        let second = matcher.apply(&mut master, &export).unwrap();
        assert_eq!(second.updated, 0);
        assert_eq!(second.matched, 1);
        assert_eq!(master, first);
    }

    #[test]
    fn missing_column_leaves_master_untouched() {
        let mut master = table("master", &["First", "Last", "Safety"], &[&["Ana", "Lee", ""]]);
        let original = master.clone();
        let partial = table("export", &["Given", "Family"], &[&["Ana", "Lee"]]);
        let error = Matcher::new(columns()).apply(&mut master, &partial).unwrap_err();
        assert!(matches!(
            error,
            RosterError::ColumnNotFound { ref table, ref column } if table == "export" && column == "Status"
        ));
        assert_eq!(master, original);

        let mut columns = columns();
        columns.training = "First Aid".to_owned();
        let error = Matcher::new(columns).apply(&mut master, &export(&[])).unwrap_err();
        assert_eq!(error.to_string(), "Column 'First Aid' not found in master");
    }

    #[test]
    fn plan_does_not_mutate() {
        let master = table("master", &["First", "Last", "Safety"], &[&["Ana", "Lee", "Pending"], &["Bo", "Wu", ""]]);
        let export = export(&[&["Bo", "Wu", "Completed"]]);
        let plan = Matcher::new(columns()).plan(&master, &export).unwrap();
        assert_eq!(plan, vec![Update { row: 1, previous: Value::Empty }]);
        assert_eq!(master.cell(1, 2), &Value::Empty);
        assert!(plan[0].changes_value());
        assert!(!Update { row: 0, previous: Value::text(COMPLETED) }.changes_value());
    }

    #[test]
    fn numeric_names_compare_by_display() {
        let mut master = Table::new(
            "master",
            vec!["First".into(), "Last".into(), "Safety".into()],
            vec![vec![Value::Number(7.0), Value::text("Lee"), Value::Empty]],
        );
        let export = export(&[&["7", "LEE", "Completed"]]);
        let report = Matcher::new(columns()).apply(&mut master, &export).unwrap();
        assert_eq!(report.updated, 1);
    }

    const NAMES: [&str; 4] = ["Ana", "Bo", "Cy", "Di"];
    const STATES: [&str; 4] = ["Completed", "completed ", "Pending", ""];

    fn name() -> impl Strategy<Value = String> {
        (0..NAMES.len(), any::<bool>(), any::<bool>()).prop_map(|(index, upper, padded)| {
            let name = if upper { NAMES[index].to_uppercase() } else { NAMES[index].to_owned() };
            if padded { format!(" {name} ") } else { name }
        })
    }

    fn record() -> impl Strategy<Value = Vec<String>> {
        (name(), name(), 0..STATES.len()).prop_map(|(first, last, state)| vec![first, last, STATES[state].to_owned()])
    }

    fn to_table(name: &str, columns: &[&str], records: &[Vec<String>]) -> Table {
        Table::new(
            name,
            columns.iter().map(|column| column.to_string()).collect(),
            records.iter()
                .map(|record| record.iter().map(|cell| Value::from(cell.as_str())).collect())
                .collect(),
        )
    }

    proptest! {
        #[test]
        fn matched_records_are_completed_and_others_unchanged(
            master_records in prop::collection::vec(record(), 0..12),
            export_records in prop::collection::vec(record(), 0..12),
        ) {
            let original = to_table("master", &["First", "Last", "Safety"], &master_records);
            let export = to_table("export", &["Given", "Family", "Status"], &export_records);
            let mut master = original.clone();
            let report = Matcher::new(columns()).apply(&mut master, &export).unwrap();

            let completed: HashSet<String> = export_records
                .iter()
                .filter(|record| is_completed(&record[2]))
                .map(|record| identity_key(&record[0], &record[1]))
                .collect();
            let mut changed = 0;
            for (row, record) in master_records.iter().enumerate() {
                if completed.contains(&identity_key(&record[0], &record[1])) {
                    prop_assert_eq!(master.cell(row, 2), &Value::text(COMPLETED));
                } else {
                    prop_assert_eq!(master.cell(row, 2), original.cell(row, 2));
                }
                if master.cell(row, 2) != original.cell(row, 2) {
                    changed += 1;
                }
            }
            prop_assert_eq!(report.updated, changed);
            prop_assert_eq!(report.rows, master_records.len());
        }

        #[test]
        fn matching_is_idempotent(
            master_records in prop::collection::vec(record(), 0..12),
            export_records in prop::collection::vec(record(), 0..12),
        ) {
            let export = to_table("export", &["Given", "Family", "Status"], &export_records);
            let mut master = to_table("master", &["First", "Last", "Safety"], &master_records);
            let matcher = Matcher::new(columns());
            let first = matcher.apply(&mut master, &export).unwrap();
            let once = master.clone();
            let second = matcher.apply(&mut master, &export).unwrap();
            prop_assert_eq!(&master, &once);
            prop_assert_eq!(second.updated, 0);
            prop_assert_eq!(second.matched, first.matched);
        }
    }
}
