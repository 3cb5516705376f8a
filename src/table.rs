//! Fixed output schemas for the `ticks` and `actions` tables.

use crate::record::{Action, Record};
use serde::Serialize;
use serde_json::Value;

/// Column header of the ticks table, in output order.
pub const TICK_HEADER: [&str; 18] = [
    "ts_ms",
    "pid",
    "strategy",
    "dry_run",
    "threads",
    "runq_us",
    "futex_us",
    "page_faults_sum",
    "psi_cpu_some",
    "psi_mem_some",
    "comm_wake",
    "comm_futex",
    "llc_per_thread",
    "total_cpus",
    "spikes",
    "io_dev",
    "io_seq_ratio",
    "num_actions",
];

/// Column header of the actions table, in output order.
pub const ACTION_HEADER: [&str; 10] = [
    "ts_ms",
    "pid",
    "action_type",
    "pid_field",
    "cgroup",
    "weight",
    "cpus",
    "io_dev",
    "readahead_kb",
    "scheduler",
];

/// Separator between members of the `cpus` cell.
pub const CPU_DELIMITER: &str = ";";

/// One flattened tick. Field order must match [`TICK_HEADER`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickRow {
    pub ts_ms: Option<String>,
    pub pid: Option<String>,
    pub strategy: Option<String>,
    pub dry_run: Option<String>,
    pub threads: Option<String>,
    pub runq_us: Option<String>,
    pub futex_us: Option<String>,
    pub page_faults_sum: Option<String>,
    pub psi_cpu_some: Option<String>,
    pub psi_mem_some: Option<String>,
    pub comm_wake: Option<String>,
    pub comm_futex: Option<String>,
    pub llc_per_thread: Option<String>,
    pub total_cpus: Option<String>,
    pub spikes: Option<String>,
    pub io_dev: Option<String>,
    pub io_seq_ratio: Option<String>,
    pub num_actions: usize,
}

impl TickRow {
    pub fn new(record: &Record, num_actions: usize) -> Self {
        let snap = record.snapshot();
        let metric = |key: &str| cell(snap.metric(key));
        Self {
            ts_ms: cell(record.ts_ms()),
            pid: cell(record.pid()),
            strategy: cell(record.strategy()),
            dry_run: cell(record.dry_run()),
            threads: metric("threads"),
            runq_us: metric("runq_us"),
            futex_us: metric("futex_us"),
            page_faults_sum: metric("page_faults_sum"),
            psi_cpu_some: metric("psi_cpu_some"),
            psi_mem_some: metric("psi_mem_some"),
            comm_wake: metric("comm_wake"),
            comm_futex: metric("comm_futex"),
            llc_per_thread: metric("llc_per_thread"),
            total_cpus: metric("total_cpus"),
            spikes: metric("spikes"),
            io_dev: cell(snap.io_dev()),
            io_seq_ratio: cell(snap.io_seq_ratio()),
            num_actions,
        }
    }
}

/// One flattened action. Field order must match [`ACTION_HEADER`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionRow {
    pub ts_ms: Option<String>,
    pub pid: Option<String>,
    pub action_type: Option<String>,
    pub pid_field: Option<String>,
    pub cgroup: Option<String>,
    pub weight: Option<String>,
    pub cpus: Option<String>,
    pub io_dev: Option<String>,
    pub readahead_kb: Option<String>,
    pub scheduler: Option<String>,
}

impl ActionRow {
    pub fn new(record: &Record, action: &Action<'_>) -> Self {
        let ts_ms = cell(record.ts_ms());
        let pid = cell(record.pid());
        match action {
            Action::Label(label) => Self {
                ts_ms,
                pid,
                action_type: Some((*label).to_string()),
                ..Self::default()
            },
            Action::Structured(fields) => Self {
                ts_ms,
                pid,
                action_type: cell(fields.get("type")),
                pid_field: cell(fields.get("pid")),
                cgroup: cell(fields.get("cgroup")),
                weight: cell(fields.get("weight")),
                cpus: cpu_list(fields.get("cpus")),
                io_dev: cell(fields.get("dev")),
                readahead_kb: cell(fields.get("readahead_kb")),
                scheduler: cell(fields.get("scheduler")),
            },
        }
    }
}

/// Render one JSON value as a table cell. `None` becomes an empty cell.
pub fn cell(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        nested => Some(nested.to_string()),
    }
}

/// Render a CPU set as `0;1;2`. A non-array value is rendered as a plain cell.
fn cpu_list(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Array(cpus) if cpus.is_empty() => None,
        Value::Array(cpus) => Some(
            cpus.iter()
                .map(|c| cell(Some(c)).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(CPU_DELIMITER),
        ),
        other => cell(Some(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_csv<S: Serialize>(header: &[&str], row: &S) -> String {
        let mut buf = Vec::new();
        {
            let mut w = csv::WriterBuilder::new()
                .has_headers(false)
                .terminator(csv::Terminator::Any(b'\n'))
                .from_writer(&mut buf);
            w.write_record(header).unwrap();
            w.serialize(row).unwrap();
            w.flush().unwrap();
        }
        String::from_utf8(buf).unwrap()
    }

    /// Header the csv crate derives from the row struct's field names.
    fn derived_header<S: Serialize>(row: &S) -> String {
        let mut buf = Vec::new();
        {
            let mut w = csv::Writer::from_writer(&mut buf);
            w.serialize(row).unwrap();
            w.flush().unwrap();
        }
        let out = String::from_utf8(buf).unwrap();
        out.lines().next().unwrap().to_string()
    }

    #[test]
    fn tick_row_field_order_matches_header() {
        assert_eq!(derived_header(&TickRow::default()), TICK_HEADER.join(","));
    }

    #[test]
    fn action_row_field_order_matches_header() {
        assert_eq!(
            derived_header(&ActionRow::default()),
            ACTION_HEADER.join(",")
        );
    }

    #[test]
    fn cell_rendering() {
        assert_eq!(cell(None), None);
        assert_eq!(cell(Some(&Value::Null)), None);
        assert_eq!(cell(Some(&json!("sda"))), Some("sda".to_string()));
        assert_eq!(cell(Some(&json!(true))), Some("true".to_string()));
        assert_eq!(cell(Some(&json!(false))), Some("false".to_string()));
        assert_eq!(cell(Some(&json!(200))), Some("200".to_string()));
        assert_eq!(cell(Some(&json!(-3))), Some("-3".to_string()));
        assert_eq!(cell(Some(&json!(0.25))), Some("0.25".to_string()));
        assert_eq!(cell(Some(&json!([1, 2]))), Some("[1,2]".to_string()));
        assert_eq!(cell(Some(&json!({"a":1}))), Some(r#"{"a":1}"#.to_string()));
    }

    #[test]
    fn cpu_list_rendering() {
        assert_eq!(cpu_list(None), None);
        assert_eq!(cpu_list(Some(&json!([]))), None);
        assert_eq!(cpu_list(Some(&json!([3]))), Some("3".to_string()));
        assert_eq!(cpu_list(Some(&json!([0, 1, 2]))), Some("0;1;2".to_string()));
        assert_eq!(cpu_list(Some(&json!("0-3"))), Some("0-3".to_string()));
    }

    #[test]
    fn tick_row_without_snapshot() {
        let rec = Record::parse(
            r#"{"ts_ms":100,"pid":5,"actions":["noop",{"type":"set_weight","pid":5,"weight":200}]}"#,
        )
        .unwrap();
        let row = TickRow::new(&rec, 2);
        assert_eq!(
            to_csv(&TICK_HEADER, &row).lines().nth(1).unwrap(),
            "100,5,,,,,,,,,,,,,,,,2"
        );
    }

    #[test]
    fn tick_row_full_snapshot() {
        let rec = Record::parse(
            r#"{"ts_ms":1700000000000,"pid":42,"strategy_type":"learned","dry_run":false,
                "snapshot":{"threads":16,"runq_us":120,"futex_us":30,"page_faults_sum":7,
                "psi_cpu_some":2.5,"psi_mem_some":0.0,"comm_wake":11,"comm_futex":4,
                "llc_per_thread":0.125,"total_cpus":8,"spikes":1,
                "io":{"dev":"nvme0n1","seq_ratio":0.9}},"actions":[]}"#,
        )
        .unwrap();
        let row = TickRow::new(&rec, 0);
        assert_eq!(row.strategy.as_deref(), Some("learned"));
        assert_eq!(row.dry_run.as_deref(), Some("false"));
        assert_eq!(row.psi_mem_some.as_deref(), Some("0.0"));
        assert_eq!(
            to_csv(&TICK_HEADER, &row).lines().nth(1).unwrap(),
            "1700000000000,42,learned,false,16,120,30,7,2.5,0.0,11,4,0.125,8,1,nvme0n1,0.9,0"
        );
    }

    #[test]
    fn action_row_label() {
        let rec = Record::parse(r#"{"ts_ms":100,"pid":5}"#).unwrap();
        let row = ActionRow::new(&rec, &Action::Label("noop"));
        assert_eq!(
            to_csv(&ACTION_HEADER, &row).lines().nth(1).unwrap(),
            "100,5,noop,,,,,,,"
        );
    }

    #[test]
    fn action_row_structured() {
        let rec = Record::parse(
            r#"{"ts_ms":100,"pid":5,"actions":[{"type":"set_weight","pid":5,"weight":200}]}"#,
        )
        .unwrap();
        let action = rec.actions().next().unwrap();
        let row = ActionRow::new(&rec, &action);
        assert_eq!(
            to_csv(&ACTION_HEADER, &row).lines().nth(1).unwrap(),
            "100,5,set_weight,5,,200,,,,"
        );
    }

    #[test]
    fn action_row_every_field() {
        let rec = Record::parse(
            r#"{"ts_ms":7,"pid":9,"actions":[{"type":"mixed","pid":9,"cgroup":"/sys/fs/cgroup/app",
                "weight":50,"cpus":[0,2,4],"dev":"sda","readahead_kb":256,"scheduler":"mq-deadline"}]}"#,
        )
        .unwrap();
        let action = rec.actions().next().unwrap();
        let row = ActionRow::new(&rec, &action);
        assert_eq!(
            to_csv(&ACTION_HEADER, &row).lines().nth(1).unwrap(),
            "7,9,mixed,9,/sys/fs/cgroup/app,50,0;2;4,sda,256,mq-deadline"
        );
    }

    #[test]
    fn cells_with_delimiters_are_quoted() {
        let rec = Record::parse(
            r#"{"ts_ms":1,"pid":2,"actions":[{"type":"say \"hi\"","cgroup":"a,b"}]}"#,
        )
        .unwrap();
        let action = rec.actions().next().unwrap();
        let row = ActionRow::new(&rec, &action);
        assert_eq!(
            to_csv(&ACTION_HEADER, &row).lines().nth(1).unwrap(),
            r#"1,2,"say ""hi""",,"a,b",,,,,"#
        );
    }
}
