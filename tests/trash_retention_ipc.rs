mod test_support;

use serde_json::json;
use test_support::{spawn_with_workspace, str_at};

#[test]
fn trash_lists_items_with_expiry_and_purge_keeps_fresh_items() {
    let mut sc = spawn_with_workspace("plannerd-trash-retention");
    let created = sc.ok("plans.create", json!({ "title": "Cells" }));
    let plan_id = str_at(&created, "/planId").to_string();
    let trashed = sc.ok("plans.trash", json!({ "planId": plan_id }));
    let deleted_at = str_at(&trashed, "/deletedAt").to_string();

    let listed = sc.ok("trash.list", json!({}));
    assert_eq!(listed["retentionDays"], json!(7));
    let items = listed["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["type"], json!("plan"));
    assert_eq!(items[0]["name"], json!("Cells"));
    assert_eq!(items[0]["deletedAt"], json!(deleted_at));
    assert!(str_at(&items[0], "/expiresAt") > deleted_at.as_str());

    let purged = sc.ok("trash.purge", json!({}));
    assert!(purged["purged"].as_array().expect("purged").is_empty());
    sc.ok("plans.restore", json!({ "planId": plan_id }));

    let listed = sc.ok("trash.list", json!({}));
    assert!(listed["items"].as_array().expect("items").is_empty());
}

#[test]
fn retention_setting_is_validated() {
    let mut sc = spawn_with_workspace("plannerd-trash-setting");
    let updated = sc.ok(
        "setup.update",
        json!({ "section": "organizer", "patch": { "trashRetentionDays": 30 } }),
    );
    assert_eq!(updated["organizer"]["trashRetentionDays"], json!(30));
    let listed = sc.ok("trash.list", json!({}));
    assert_eq!(listed["retentionDays"], json!(30));

    assert_eq!(
        sc.err_code(
            "setup.update",
            json!({ "section": "organizer", "patch": { "trashRetentionDays": 0 } })
        ),
        "bad_params"
    );
}
