mod support;

use pretty_assertions::assert_eq;
use support::{keys, read_rows, row, write_csv};
use taskseal_csv::{
    flatten_result_columns, merge_csv_columns, parse_csv, CsvCodec, ErrorKind, RESULT_HEADERS,
    TASK_HEADERS,
};

#[test]
fn merge_folds_extra_columns() {
    let dir = tempfile::tempdir().unwrap();
    let wide = dir.path().join("wide.csv");
    let narrow = dir.path().join("narrow.csv");
    write_csv(
        &wide,
        &[" Name", "Type ", "symbol", "amount", "content"],
        &[
            row(&["Task 1", "execute_actions", "BTC/USDT", "0.01", "buy"]),
            row(&["Task 2", "monitor", "ETH", "", ""]),
        ],
    );

    assert_eq!(merge_csv_columns(&wide, &narrow).unwrap(), 2);
    let (headers, rows) = read_rows(&narrow);
    assert_eq!(headers, TASK_HEADERS);
    assert_eq!(
        rows,
        [
            row(&[
                "Task 1",
                "execute_actions",
                r#"{"amount":"0.01","content":"buy","symbol":"BTC/USDT"}"#
            ]),
            row(&["Task 2", "monitor", r#"{"symbol":"ETH"}"#]),
        ]
    );
}

#[test]
fn merging_a_narrow_file_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let narrow = dir.path().join("narrow.csv");
    let again = dir.path().join("again.csv");
    let rows = vec![row(&["Task 1", "report", "free text, \"quoted\""])];
    write_csv(&narrow, &TASK_HEADERS, &rows);

    merge_csv_columns(&narrow, &again).unwrap();
    assert_eq!(parse_csv(&again).unwrap(), parse_csv(&narrow).unwrap());
}

#[test]
fn merge_reports_the_offending_row() {
    let dir = tempfile::tempdir().unwrap();
    let wide = dir.path().join("wide.csv");
    let narrow = dir.path().join("narrow.csv");
    write_csv(
        &wide,
        &TASK_HEADERS,
        &[row(&["Task 1", "t", "x"]), row(&["Task 2", "", "y"])],
    );

    let err = merge_csv_columns(&wide, &narrow).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert_eq!(err.row(), Some(2));
    assert!(err.to_string().ends_with("row 2: schema error: empty 'type' value"));
    assert!(!narrow.exists());
}

#[test]
fn merge_rejects_values_under_an_unnamed_column() {
    let dir = tempfile::tempdir().unwrap();
    let wide = dir.path().join("wide.csv");
    let narrow = dir.path().join("narrow.csv");
    std::fs::write(&wide, "name,type,content,\nTask 1,t,buy,SECRET_AMOUNT=5\n").unwrap();

    let err = merge_csv_columns(&wide, &narrow).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert_eq!(err.row(), Some(1));
    assert!(!narrow.exists());

    std::fs::write(&wide, "name,type,content,\nTask 1,t,buy,\n").unwrap();
    assert_eq!(merge_csv_columns(&wide, &narrow).unwrap(), 1);
    assert_eq!(read_rows(&narrow).1, [row(&["Task 1", "t", "buy"])]);
}

#[test]
fn flatten_spreads_result_keys_into_columns() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results.csv");
    let flat = dir.path().join("flat.csv");
    write_csv(
        &results,
        &RESULT_HEADERS,
        &[
            row(&["Task 1", r#"{"status":"completed","data":"result1"}"#]),
            row(&["Task 3", r#"{"status":"failed","error":"test error","code":7}"#]),
        ],
    );

    assert_eq!(flatten_result_columns(&results, &flat).unwrap(), 2);
    let (headers, rows) = read_rows(&flat);
    assert_eq!(headers, ["name", "code", "data", "error", "status"]);
    assert_eq!(
        rows,
        [
            row(&["Task 1", "", "result1", "", "completed"]),
            row(&["Task 3", "7", "", "test error", "failed"]),
        ]
    );
}

#[test]
fn flatten_rejects_non_object_results() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results.csv");
    write_csv(
        &results,
        &RESULT_HEADERS,
        &[row(&["Task 1", "{}"]), row(&["Task 2", "[1,2]"])],
    );

    let err = flatten_result_columns(&results, dir.path().join("flat.csv")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert_eq!(err.row(), Some(2));
}

#[test]
fn decrypted_results_flatten_after_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("results.csv");
    let sealed = dir.path().join("sealed.csv");
    let opened = dir.path().join("opened.csv");
    let flat = dir.path().join("flat.csv");
    write_csv(
        &plain,
        &RESULT_HEADERS,
        &[row(&["Task 1", r#"{"status":"completed","data":{"fills":2}}"#])],
    );

    let codec = CsvCodec::new();
    codec.encrypt_results(&plain, &sealed, keys()).unwrap();
    codec.decrypt_results(&sealed, &opened, keys()).unwrap();
    flatten_result_columns(&opened, &flat).unwrap();

    let (headers, rows) = read_rows(&flat);
    assert_eq!(headers, ["name", "data", "status"]);
    assert_eq!(rows, [row(&["Task 1", r#"{"fills":2}"#, "completed"])]);
}
