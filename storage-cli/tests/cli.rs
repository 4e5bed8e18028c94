#[cfg(test)]
mod test {
    use assert_cmd::prelude::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;
    use std::process::Command;

    #[test]
    fn put_then_get_round_trips_a_value() -> Result<(), Box<dyn std::error::Error>> {
        let dir = assert_fs::TempDir::new()?;

        let mut put = Command::cargo_bin("storage-cli")?;
        put.arg("--data-dir").arg(dir.path()).args(["put", "name", "\"ada\""]);
        put.assert().success().stdout(predicate::str::contains("ok"));

        let mut get = Command::cargo_bin("storage-cli")?;
        get.arg("--data-dir").arg(dir.path()).args(["get", "name"]);
        get.assert().success().stdout(predicate::str::contains("ada"));

        Ok(())
    }

    #[test]
    fn get_of_a_missing_key_fails() -> Result<(), Box<dyn std::error::Error>> {
        let dir = assert_fs::TempDir::new()?;

        let mut get = Command::cargo_bin("storage-cli")?;
        get.arg("--data-dir").arg(dir.path()).args(["get", "nobody"]);
        get.assert().failure().stderr(predicate::str::contains("not found"));

        Ok(())
    }

    #[test]
    fn del_removes_a_previously_put_key() -> Result<(), Box<dyn std::error::Error>> {
        let dir = assert_fs::TempDir::new()?;

        let mut put = Command::cargo_bin("storage-cli")?;
        put.arg("--data-dir").arg(dir.path()).args(["put", "name", "\"grace\""]);
        put.assert().success();

        let mut del = Command::cargo_bin("storage-cli")?;
        del.arg("--data-dir").arg(dir.path()).args(["del", "name"]);
        del.assert().success().stdout(predicate::str::contains("deleted"));

        let mut get = Command::cargo_bin("storage-cli")?;
        get.arg("--data-dir").arg(dir.path()).args(["get", "name"]);
        get.assert().failure();

        Ok(())
    }

    #[test]
    fn del_of_a_missing_key_reports_not_found_without_failing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = assert_fs::TempDir::new()?;

        let mut del = Command::cargo_bin("storage-cli")?;
        del.arg("--data-dir").arg(dir.path()).args(["del", "nobody"]);
        del.assert().success().stdout(predicate::str::contains("not found"));

        Ok(())
    }

    #[test]
    fn scan_lists_every_put_key() -> Result<(), Box<dyn std::error::Error>> {
        let dir = assert_fs::TempDir::new()?;

        for key in ["alice", "bob"] {
            let mut put = Command::cargo_bin("storage-cli")?;
            put.arg("--data-dir").arg(dir.path()).args(["put", key, "1"]);
            put.assert().success();
        }

        let mut scan = Command::cargo_bin("storage-cli")?;
        scan.arg("--data-dir").arg(dir.path()).arg("scan");
        scan.assert().success().stdout(predicate::str::contains("alice")).stdout(predicate::str::contains("bob"));

        Ok(())
    }

    #[test]
    fn status_reports_record_count_after_puts() -> Result<(), Box<dyn std::error::Error>> {
        let dir = assert_fs::TempDir::new()?;

        let mut put = Command::cargo_bin("storage-cli")?;
        put.arg("--data-dir").arg(dir.path()).args(["put", "k", "1"]);
        put.assert().success();

        let mut status = Command::cargo_bin("storage-cli")?;
        status.arg("--data-dir").arg(dir.path()).arg("status");
        status.assert().success().stdout(predicate::str::contains("records: 1"));

        Ok(())
    }
}
