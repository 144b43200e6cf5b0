use std::sync::Arc;

use super::mock::*;
use crate::{
    config::UploadSettings,
    errors::DistError,
    host::{do_upload, upload_files, Destination},
};
use camino::Utf8PathBuf;
use shipyard_schema::StepStatus;

fn files(checkout: &Checkout, names: &[&str]) -> Vec<Utf8PathBuf> {
    names
        .iter()
        .map(|name| {
            checkout.write(&format!("build/{name}"), &format!("contents of {name}"));
            checkout.root.join("build").join(name)
        })
        .collect()
}

#[test]
fn destinations() {
    let dest = Destination::parse("dl.example.com/releases/");
    assert_eq!(dest.bucket, "dl.example.com");
    assert_eq!(dest.key_for("a.deb"), "releases/a.deb");

    let dest = Destination::parse("dl.example.com");
    assert_eq!(dest.prefix, None);
    assert_eq!(dest.key_for("a.deb"), "a.deb");
}

#[test]
fn uploads_are_public() {
    let checkout = Checkout::new();
    let files = files(&checkout, &["a.deb", "a.deb.asc"]);
    let store = MemoryStore::default();
    let dest = Destination::parse("dl/nightlies");
    let uploads = upload_files(&store, &dest, &files, false).unwrap();

    assert_eq!(uploads.len(), 2);
    assert!(uploads.iter().all(|u| u.status == StepStatus::Done));
    assert_eq!(uploads[1].file, "a.deb.asc");
    assert_eq!(uploads[1].key, "nightlies/a.deb.asc");
    let objects = store.objects.lock().unwrap();
    assert_eq!(objects["dl/nightlies/a.deb"], b"contents of a.deb");
    assert!(store.public.lock().unwrap().contains("dl/nightlies/a.deb.asc"));
}

#[test]
fn existing_objects_are_left_alone() {
    let checkout = Checkout::new();
    let files = files(&checkout, &["a.deb", "b.deb"]);
    let store = MemoryStore::default();
    store
        .objects
        .lock()
        .unwrap()
        .insert("dl/a.deb".to_owned(), b"old".to_vec());
    let dest = Destination::parse("dl");

    let uploads = upload_files(&store, &dest, &files, false).unwrap();
    let statuses = uploads.iter().map(|u| u.status).collect::<Vec<_>>();
    assert_eq!(statuses, vec![StepStatus::Skipped, StepStatus::Done]);
    assert_eq!(store.objects.lock().unwrap()["dl/a.deb"], b"old");

    let uploads = upload_files(&store, &dest, &files, true).unwrap();
    assert!(uploads.iter().all(|u| u.status == StepStatus::Done));
    assert_eq!(store.objects.lock().unwrap()["dl/a.deb"], b"contents of a.deb");
}

#[test]
fn timeouts_only_affect_one_file() {
    let checkout = Checkout::new();
    let files = files(&checkout, &["a.deb", "b.rpm"]);
    let store = MemoryStore {
        timeout_put: Some(".deb"),
        ..MemoryStore::default()
    };
    let uploads = upload_files(&store, &Destination::parse("dl"), &files, false).unwrap();
    let statuses = uploads.iter().map(|u| u.status).collect::<Vec<_>>();
    assert_eq!(statuses, vec![StepStatus::TimedOut, StepStatus::Done]);
    assert!(!store.public.lock().unwrap().contains("dl/a.deb"));
}

#[test]
fn failures_stop_the_upload() {
    let checkout = Checkout::new();
    let files = files(&checkout, &["a.deb", "b.rpm"]);
    let store = MemoryStore {
        fail_put: Some(".deb"),
        ..MemoryStore::default()
    };
    let err = upload_files(&store, &Destination::parse("dl/x"), &files, false).unwrap_err();
    match err {
        DistError::UploadFailed {
            file, bucket, key, ..
        } => {
            assert_eq!(file, "a.deb");
            assert_eq!(bucket, "dl");
            assert_eq!(key, "x/a.deb");
        }
        e => panic!("unexpected error {e}"),
    }
    assert!(store.objects.lock().unwrap().is_empty());
}

#[test]
fn nothing_to_do_without_a_destination() {
    let checkout = Checkout::new();
    let cfg = mock_config(&checkout);
    let runner = Arc::new(FakeRunner::new());
    let tools = mock_tools(runner.clone());
    let files = files(&checkout, &["a.deb"]);
    assert!(do_upload(&cfg, &tools, &files).unwrap().is_empty());
    assert!(runner.calls_to("aws").is_empty());
}

#[test]
fn through_the_aws_cli() {
    let checkout = Checkout::new();
    let mut cfg = mock_config(&checkout);
    cfg.upload = Some(UploadSettings {
        destination: "dl.example.com/releases".to_owned(),
        overwrite: false,
    });
    let runner = Arc::new(FakeRunner::new());
    let tools = mock_tools(runner.clone());
    let files = files(&checkout, &["a.deb"]);

    let uploads = do_upload(&cfg, &tools, &files).unwrap();
    assert_eq!(uploads[0].status, StepStatus::Done);
    assert_eq!(uploads[0].bucket, "dl.example.com");
    assert!(runner
        .objects
        .lock()
        .unwrap()
        .contains_key("dl.example.com/releases/a.deb"));
    assert!(runner
        .public
        .lock()
        .unwrap()
        .contains("dl.example.com/releases/a.deb"));

    let subcommands = runner
        .calls_to("aws")
        .iter()
        .map(|c| c.args[1].clone())
        .collect::<Vec<_>>();
    assert_eq!(subcommands, vec!["head-object", "cp", "put-object-acl"]);

    // second time around the object is already there
    let uploads = do_upload(&cfg, &tools, &files).unwrap();
    assert_eq!(uploads[0].status, StepStatus::Skipped);
}

#[test]
fn no_aws_cli() {
    let checkout = Checkout::new();
    let mut cfg = mock_config(&checkout);
    cfg.upload = Some(UploadSettings {
        destination: "dl".to_owned(),
        overwrite: false,
    });
    let runner = Arc::new(FakeRunner {
        missing: vec!["aws"],
        ..FakeRunner::new()
    });
    let tools = mock_tools(runner);
    let files = files(&checkout, &["a.deb", "b.deb"]);
    let uploads = do_upload(&cfg, &tools, &files).unwrap();
    assert_eq!(uploads.len(), 2);
    assert!(uploads.iter().all(|u| u.status == StepStatus::Skipped));
    assert_eq!(uploads[1].key, "b.deb");
}

#[test]
fn denied_existence_check_is_fatal() {
    let checkout = Checkout::new();
    let mut cfg = mock_config(&checkout);
    cfg.upload = Some(UploadSettings {
        destination: "dl.example.com/releases".to_owned(),
        overwrite: false,
    });
    let runner = Arc::new(FakeRunner {
        head_denied: true,
        ..FakeRunner::new()
    });
    let tools = mock_tools(runner.clone());
    let files = files(&checkout, &["a.deb"]);

    let err = do_upload(&cfg, &tools, &files).unwrap_err();
    match err {
        DistError::UploadFailed { file, details, .. } => {
            assert_eq!(file, "a.deb");
            assert!(
                matches!(*details, DistError::ToolStatus { ref stderr, .. } if stderr.contains("403")),
                "{details}"
            );
        }
        e => panic!("unexpected error {e}"),
    }
    let subcommands = runner
        .calls_to("aws")
        .iter()
        .map(|c| c.args[1].clone())
        .collect::<Vec<_>>();
    assert_eq!(subcommands, vec!["head-object"]);
    assert!(runner.objects.lock().unwrap().is_empty());
}
