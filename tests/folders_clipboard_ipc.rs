mod test_support;

use serde_json::json;
use test_support::{spawn_with_workspace, str_at, Sidecar};

fn class(sc: &mut Sidecar, name: &str) -> String {
    let created = sc.ok("classes.create", json!({ "name": name }));
    str_at(&created, "/classId").to_string()
}

fn folder(sc: &mut Sidecar, class_id: &str, parent: Option<&str>, name: &str) -> String {
    let created = sc.ok(
        "folders.create",
        json!({ "classId": class_id, "parentId": parent, "name": name }),
    );
    str_at(&created, "/folderId").to_string()
}

fn plan_in(sc: &mut Sidecar, folder_id: &str, title: &str) -> String {
    let created = sc.ok(
        "plans.create",
        json!({ "folderId": folder_id, "title": title }),
    );
    str_at(&created, "/planId").to_string()
}

#[test]
fn folders_get_default_color_and_nest() {
    let mut sc = spawn_with_workspace("plannerd-folders-nest");
    let class_id = class(&mut sc, "Physics");
    let unit = folder(&mut sc, &class_id, None, "Unit 1");
    let _week = folder(&mut sc, &class_id, Some(&unit), "Week 1");

    let roots = sc.ok("folders.list", json!({ "classId": class_id }));
    let roots = roots["folders"].as_array().expect("folders");
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0]["color"], json!("#fdba74"));
    assert_eq!(roots[0]["folderCount"], json!(1));

    let children = sc.ok(
        "folders.list",
        json!({ "classId": class_id, "parentId": unit }),
    );
    assert_eq!(children["folders"][0]["name"], json!("Week 1"));

    let updated = sc.ok(
        "folders.update",
        json!({ "folderId": unit, "patch": { "color": "#93c5fd", "name": "Motion" } }),
    );
    assert_eq!(updated["folder"]["color"], json!("#93c5fd"));
    assert_eq!(
        sc.err_code(
            "folders.update",
            json!({ "folderId": unit, "patch": { "color": "blue" } })
        ),
        "bad_params"
    );
}

#[test]
fn folder_cannot_move_into_its_own_subtree() {
    let mut sc = spawn_with_workspace("plannerd-folders-move");
    let class_id = class(&mut sc, "Physics");
    let unit = folder(&mut sc, &class_id, None, "Unit 1");
    let week = folder(&mut sc, &class_id, Some(&unit), "Week 1");

    assert_eq!(
        sc.err_code(
            "folders.move",
            json!({ "folderId": unit, "targetParentId": week })
        ),
        "bad_params"
    );
    assert_eq!(
        sc.err_code(
            "folders.move",
            json!({ "folderId": unit, "targetParentId": unit })
        ),
        "bad_params"
    );

    let other_class = class(&mut sc, "Chemistry");
    let plan_id = plan_in(&mut sc, &week, "Velocity");
    let moved = sc.ok(
        "folders.move",
        json!({ "folderId": unit, "targetClassId": other_class }),
    );
    assert_eq!(moved["folder"]["classId"], json!(other_class));
    let plans = sc.ok("plans.list", json!({ "classId": other_class }));
    assert_eq!(plans["plans"][0]["id"], json!(plan_id));
}

#[test]
fn duplicate_folder_deep_copies_contents() {
    let mut sc = spawn_with_workspace("plannerd-folders-duplicate");
    let class_id = class(&mut sc, "Physics");
    let unit = folder(&mut sc, &class_id, None, "Unit 1");
    let week = folder(&mut sc, &class_id, Some(&unit), "Week 1");
    plan_in(&mut sc, &unit, "Intro");
    plan_in(&mut sc, &week, "Velocity");

    let dup = sc.ok("folders.duplicate", json!({ "folderId": unit }));
    assert_eq!(dup["folder"]["name"], json!("Unit 1 Copy"));
    assert_eq!(dup["folder"]["planCount"], json!(1));
    assert_eq!(dup["folder"]["folderCount"], json!(1));

    let all = sc.ok("plans.list", json!({ "classId": class_id }));
    assert_eq!(all["plans"].as_array().expect("plans").len(), 4);
}

#[test]
fn clipboard_paste_copies_plan_and_keeps_item() {
    let mut sc = spawn_with_workspace("plannerd-clipboard-plan");
    let class_id = class(&mut sc, "Physics");
    let unit = folder(&mut sc, &class_id, None, "Unit 1");
    let target = folder(&mut sc, &class_id, None, "Unit 2");
    let plan_id = plan_in(&mut sc, &unit, "Velocity");

    assert_eq!(
        sc.err_code("clipboard.paste", json!({ "targetFolderId": target })),
        "bad_params"
    );
    let copied = sc.ok(
        "clipboard.copy",
        json!({ "itemId": plan_id, "itemType": "plan" }),
    );
    assert_eq!(copied["clipboard"]["itemType"], json!("plan"));

    let first = sc.ok("clipboard.paste", json!({ "targetFolderId": target }));
    let second = sc.ok("clipboard.paste", json!({ "targetFolderId": target }));
    assert_ne!(first["newId"], second["newId"]);
    assert_eq!(first["classId"], json!(class_id));

    let in_target = sc.ok("plans.list", json!({ "folderId": target }));
    let titles: Vec<&str> = in_target["plans"]
        .as_array()
        .expect("plans")
        .iter()
        .map(|p| p["title"].as_str().expect("title"))
        .collect();
    assert_eq!(titles, vec!["Velocity", "Velocity"]);

    let held = sc.ok("clipboard.get", json!({}));
    assert_eq!(held["clipboard"]["itemId"], json!(plan_id));
    sc.ok("clipboard.clear", json!({}));
    let held = sc.ok("clipboard.get", json!({}));
    assert_eq!(held["clipboard"], json!(null));
}

#[test]
fn pasting_folder_into_itself_copies_once() {
    let mut sc = spawn_with_workspace("plannerd-clipboard-folder");
    let class_id = class(&mut sc, "Physics");
    let unit = folder(&mut sc, &class_id, None, "Unit 1");
    plan_in(&mut sc, &unit, "Intro");

    sc.ok(
        "clipboard.copy",
        json!({ "itemId": unit, "itemType": "folder" }),
    );
    let pasted = sc.ok("clipboard.paste", json!({ "targetFolderId": unit }));
    let new_id = str_at(&pasted, "/newId").to_string();

    let children = sc.ok(
        "folders.list",
        json!({ "classId": class_id, "parentId": unit }),
    );
    let children = children["folders"].as_array().expect("folders");
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["id"], json!(new_id));
    assert_eq!(children[0]["name"], json!("Unit 1"));
    assert_eq!(children[0]["folderCount"], json!(0));
    assert_eq!(children[0]["planCount"], json!(1));
}

#[test]
fn trashing_folder_cascades_and_restore_brings_contents_back() {
    let mut sc = spawn_with_workspace("plannerd-folders-trash");
    let class_id = class(&mut sc, "Physics");
    let unit = folder(&mut sc, &class_id, None, "Unit 1");
    let week = folder(&mut sc, &class_id, Some(&unit), "Week 1");
    let plan_id = plan_in(&mut sc, &week, "Velocity");

    sc.ok("folders.trash", json!({ "folderId": unit }));
    let plans = sc.ok("plans.list", json!({ "classId": class_id }));
    assert!(plans["plans"].as_array().expect("plans").is_empty());

    let trash = sc.ok("trash.list", json!({}));
    let items = trash["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["type"], json!("folder"));
    assert_eq!(items[0]["id"], json!(unit));

    assert_eq!(
        sc.err_code("folders.restore", json!({ "folderId": week })),
        "bad_params"
    );
    sc.ok("folders.restore", json!({ "folderId": unit }));
    let opened = sc.ok("plans.open", json!({ "planId": plan_id }));
    assert_eq!(opened["plan"]["deletedAt"], json!(null));

    let removed = sc.ok("folders.delete", json!({ "folderId": unit }));
    assert_eq!(removed["removedPlanIds"], json!([plan_id]));
    let roots = sc.ok("folders.list", json!({ "classId": class_id, "includeDeleted": true }));
    assert!(roots["folders"].as_array().expect("folders").is_empty());
}

#[test]
fn class_trash_cascades_and_delete_purges_everything() {
    let mut sc = spawn_with_workspace("plannerd-classes-trash");
    let class_id = class(&mut sc, "Physics");
    let unit = folder(&mut sc, &class_id, None, "Unit 1");
    let plan_id = plan_in(&mut sc, &unit, "Velocity");

    sc.ok("classes.trash", json!({ "classId": class_id }));
    let classes = sc.ok("classes.list", json!({}));
    assert!(classes["classes"].as_array().expect("classes").is_empty());
    let plans = sc.ok("plans.list", json!({ "classId": class_id }));
    assert!(plans["plans"].as_array().expect("plans").is_empty());
    let opened = sc.ok("plans.open", json!({ "planId": plan_id }));
    assert!(opened["plan"]["deletedAt"].is_string());

    sc.ok("classes.restore", json!({ "classId": class_id }));
    let classes = sc.ok("classes.list", json!({}));
    assert_eq!(classes["classes"][0]["planCount"], json!(1));
    assert_eq!(classes["classes"][0]["folderCount"], json!(1));

    let deleted = sc.ok("classes.delete", json!({ "classId": class_id }));
    assert_eq!(deleted["removedPlanIds"], json!([plan_id]));
    let classes = sc.ok("classes.list", json!({ "includeDeleted": true }));
    assert!(classes["classes"].as_array().expect("classes").is_empty());
}

#[test]
fn plan_restore_waits_for_its_class_and_folder() {
    let mut sc = spawn_with_workspace("plannerd-plans-restore-guard");
    let class_id = class(&mut sc, "Biology");
    let unit = folder(&mut sc, &class_id, None, "Unit 1");
    let plan_id = plan_in(&mut sc, &unit, "Cells");

    sc.ok("plans.trash", json!({ "planId": plan_id }));
    sc.ok("folders.trash", json!({ "folderId": unit }));
    assert_eq!(
        sc.err_code("plans.restore", json!({ "planId": plan_id })),
        "bad_params"
    );
    sc.ok("folders.restore", json!({ "folderId": unit }));

    sc.ok("classes.trash", json!({ "classId": class_id }));
    assert_eq!(
        sc.err_code("plans.restore", json!({ "planId": plan_id })),
        "bad_params"
    );
    sc.ok("classes.restore", json!({ "classId": class_id }));

    let opened = sc.ok("plans.open", json!({ "planId": plan_id }));
    assert!(opened["plan"]["deletedAt"].is_string());
    sc.ok("plans.restore", json!({ "planId": plan_id }));
    let plans = sc.ok("plans.list", json!({ "classId": class_id }));
    assert_eq!(plans["plans"][0]["id"], json!(plan_id));
}
