#![cfg(not(target_arch = "wasm32"))]

use std::fs;
use std::path::Path;

use retroshade_registry::{load_compilers, load_drivers, MachineVariant, Registry};

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create module dir");
    }
    fs::write(path, b"MZ").expect("write module stub");
}

#[test]
fn compilers_with_missing_modules_are_dropped() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let root = tmp.path().join("compilers");
    touch(&root.join("vendor_a/cc.dll"));
    touch(&root.join("asm.dll"));

    let list = tmp.path().join("compilers.json");
    fs::write(
        &list,
        r#"[
            { "name": "Vendor A", "path": "vendor_a/cc.dll" },
            { "name": "Gone", "path": "vendor_b/cc.dll" },
            { "name": "Assembler", "path": "asm.dll" }
        ]"#,
    )
    .unwrap();

    let compilers = load_compilers(&list, &root).expect("load compilers");
    let names: Vec<_> = compilers.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Vendor A", "Assembler"]);
}

#[test]
fn drivers_keep_order_and_machine_variants() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let root = tmp.path().join("drivers");
    touch(&root.join("first.so"));
    touch(&root.join("third.so"));

    let list = tmp.path().join("drivers.json");
    fs::write(
        &list,
        r#"[
            { "fields": ["First", "first.so"], "machines": [["M100", "-a"], ["M200"]] },
            { "fields": ["Second", "second.so"], "machines": [["X"]] },
            { "fields": ["Third", "third.so", "extra"] }
        ]"#,
    )
    .unwrap();

    let drivers = load_drivers(&list, &root).expect("load drivers");
    assert_eq!(drivers.len(), 2);
    assert_eq!(drivers[0].label(), "First");
    assert_eq!(
        drivers[0].machines,
        vec![MachineVariant::new(["M100", "-a"]), MachineVariant::new(["M200"])]
    );
    assert_eq!(drivers[1].module(), Some("third.so"));
    assert!(drivers[1].machines.is_empty());
}

#[test]
fn registry_loads_both_lists() {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    touch(&tmp.path().join("cc/c.dll"));
    touch(&tmp.path().join("drv/d.so"));
    let compilers = tmp.path().join("compilers.json");
    let drivers = tmp.path().join("drivers.json");
    fs::write(&compilers, r#"[{ "name": "C", "path": "c.dll" }]"#).unwrap();
    fs::write(&drivers, r#"[{ "fields": ["D", "d.so"], "machines": [["M"]] }]"#).unwrap();

    let registry = Registry::load(
        &compilers,
        &tmp.path().join("cc"),
        &drivers,
        &tmp.path().join("drv"),
    )
    .expect("load registry");
    assert_eq!(registry.compilers.len(), 1);
    assert_eq!(registry.drivers.len(), 1);
}
