use super::common::*;
use crate::workflows::kyc::audit::write_transitions_csv;

#[test]
fn transitions_are_written_one_row_each() {
    let harness = harness();
    let driver_id = submitted_driver(&harness, "drv-audit");
    reject(&harness, &driver_id);

    let records = harness.store.all_records();
    let mut buffer = Vec::new();
    let rows = write_transitions_csv(&mut buffer, &records).expect("csv written");

    assert_eq!(rows, 5);
    let output = String::from_utf8(buffer).expect("utf8 csv");
    let lines: Vec<_> = output.lines().collect();
    assert_eq!(lines[0], "Driver ID,From,To,At,Actor,Note");
    assert_eq!(
        lines[1],
        "drv-audit,not_started,step_1,2025-03-03T09:00:00+00:00,driver,"
    );
    assert_eq!(
        lines[5],
        "drv-audit,submitted,rejected,2025-03-03T09:00:00+00:00,reviewer:reviewer-ada,license photo unreadable"
    );
}

#[test]
fn records_are_grouped_by_driver() {
    let harness = harness();
    let second = driver("drv-b");
    let first = driver("drv-a");
    harness
        .service
        .submit_step(&second, step_draft(1))
        .expect("step 1");
    harness
        .service
        .submit_step(&first, step_draft(1))
        .expect("step 1");

    let mut buffer = Vec::new();
    write_transitions_csv(&mut buffer, &harness.store.all_records()).expect("csv written");

    let output = String::from_utf8(buffer).expect("utf8 csv");
    let drivers: Vec<_> = output
        .lines()
        .skip(1)
        .filter_map(|line| line.split(',').next())
        .collect();
    assert_eq!(drivers, vec!["drv-a", "drv-b"]);
}

#[test]
fn empty_input_writes_nothing() {
    let mut buffer = Vec::new();

    let rows = write_transitions_csv(&mut buffer, &[]).expect("csv written");

    assert_eq!(rows, 0);
    assert!(buffer.is_empty());
}
