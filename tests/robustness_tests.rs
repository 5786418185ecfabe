mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

const HEADER: &str = "type, client, owner, account, to, amount";

#[test]
fn test_malformed_csv_handling() {
    let csv = common::write_csv(
        HEADER,
        &[
            "open, 1, alice, 1001, ,",
            // Valid deposit
            "deposit, , , 1001, , 1.0",
            // Invalid type
            "chargeback, , , 1001, , 1.0",
            // Missing amount for deposit (required)
            "deposit, , , 1001, ,",
            // Valid deposit again
            "deposit, , , 1001, , 2.0",
        ],
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("ledgerguard"));
    cmd.arg(csv.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Action rejected"))
        .stderr(predicate::str::contains("Transaction amount cannot be null"))
        .stdout(predicate::str::contains("1001,alice,3.00,false"));
}

#[test]
fn test_invalid_data_types() {
    let csv = common::write_csv(
        HEADER,
        &[
            "open, 1, alice, 1001, ,",
            // Text in amount field
            "deposit, , , 1001, , not_a_number",
            // Non-integer client id
            "open, abc, bob, 1002, ,",
            // Valid deposit
            "deposit, , , 1001, , 5.0",
        ],
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("ledgerguard"));
    cmd.arg(csv.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("CSV error"))
        .stdout(predicate::str::contains("1001,alice,5.00,false"))
        .stdout(predicate::str::contains("1002").not());
}

#[test]
fn test_unknown_accounts_do_not_abort_the_batch() {
    let csv = common::write_csv(
        HEADER,
        &[
            "open, 1, alice, 1001, ,",
            "deposit, , , 9999, , 1.0",
            "transfer, , , 1001, 9999, 1.0",
            "transfer, , , 1001, 1001, 1.0",
            "deposit, , , 1001, , 7.0",
        ],
    )
    .unwrap();

    Command::new(cargo_bin!("ledgerguard"))
        .arg(csv.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Account not found: 9999"))
        .stderr(predicate::str::contains("Receiver account not found"))
        .stderr(predicate::str::contains("Cannot transfer to the same account"))
        .stdout(predicate::str::contains("1001,alice,7.00,false"));
}
