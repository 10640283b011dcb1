use std::fs;
use std::path::PathBuf;

use footy_value::users::{
    AccountError, FREE_CREDITS, Tier, UserManager, hash_password, verify_password,
};

fn temp_store(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("footy_value_users_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir.join("user_data.json")
}

fn manager(path: &PathBuf) -> UserManager {
    UserManager::load(path).expect("store loads").with_hash_iterations(10)
}

fn verified_user(users: &mut UserManager, email: &str) {
    let code = users.register(email, "hunter22", "Sam").unwrap();
    users.verify(email, &code).unwrap();
}

#[test]
fn missing_file_is_an_empty_store() {
    let path = temp_store("missing");
    let users = manager(&path);
    assert!(users.list().is_empty());
    assert!(!path.exists());
}

#[test]
fn registration_requires_verification() {
    let path = temp_store("verify");
    let mut users = manager(&path);
    let code = users.register("Sam@Example.com ", "hunter22", "Sam").unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    assert!(matches!(
        users.authenticate("sam@example.com", "hunter22"),
        Err(AccountError::Unverified)
    ));
    assert!(matches!(users.verify("sam@example.com", "000000x"), Err(AccountError::BadCode)));
    users.verify("sam@example.com", &code).unwrap();

    let account = users.authenticate("SAM@example.com", "hunter22").unwrap();
    assert_eq!(account.email, "sam@example.com");
    assert_eq!(account.credits_remaining(), FREE_CREDITS);
    assert!(account.last_login.is_some());
    assert!(matches!(
        users.authenticate("sam@example.com", "wrong-pass"),
        Err(AccountError::BadPassword)
    ));
}

#[test]
fn registration_rejects_bad_input() {
    let path = temp_store("reject");
    let mut users = manager(&path);
    assert!(matches!(
        users.register("not-an-email", "hunter22", ""),
        Err(AccountError::InvalidEmail(_))
    ));
    assert!(matches!(users.register("a@b.io", "123", ""), Err(AccountError::WeakPassword)));
    users.register("a@b.io", "hunter22", "").unwrap();
    assert!(matches!(
        users.register("A@B.io", "hunter22", ""),
        Err(AccountError::AlreadyRegistered(_))
    ));
    assert_eq!(users.get("a@b.io").unwrap().name, "a");
}

#[test]
fn usage_never_drives_credits_negative() {
    let path = temp_store("usage");
    let mut users = manager(&path);
    verified_user(&mut users, "fan@example.com");

    assert_eq!(users.register_usage("fan@example.com", 3).unwrap(), FREE_CREDITS - 3);
    let err = users.register_usage("fan@example.com", 3).unwrap_err();
    assert!(matches!(
        err,
        AccountError::InsufficientCredits { needed: 3, available: 2 }
    ));
    assert_eq!(users.register_usage("fan@example.com", 2).unwrap(), 0);
    assert_eq!(users.credits_remaining("fan@example.com").unwrap(), 0);

    let stats = users.usage_stats("fan@example.com").unwrap();
    assert_eq!(stats.analyses, 2);
    assert_eq!(stats.markets, FREE_CREDITS);
    assert!(stats.last_used.is_some());
}

#[test]
fn purchases_apply_once_and_upgrade_tier() {
    let path = temp_store("purchase");
    let mut users = manager(&path);
    verified_user(&mut users, "fan@example.com");

    assert!(users.apply_purchase("fan@example.com", "cs_1", 30, Tier::Standard).unwrap());
    assert!(!users.apply_purchase("fan@example.com", "cs_1", 30, Tier::Standard).unwrap());
    assert_eq!(users.credits_remaining("fan@example.com").unwrap(), FREE_CREDITS + 30);

    assert!(users.apply_purchase("fan@example.com", "cs_2", 60, Tier::Pro).unwrap());
    assert!(users.apply_purchase("fan@example.com", "cs_3", 30, Tier::Standard).unwrap());
    let account = users.get("fan@example.com").unwrap();
    assert_eq!(account.tier, Tier::Pro);
    assert_eq!(account.purchased_credits, 120);
}

#[test]
fn changes_survive_a_reload() {
    let path = temp_store("reload");
    {
        let mut users = manager(&path);
        verified_user(&mut users, "fan@example.com");
        users.register_usage("fan@example.com", 2).unwrap();
        users.add_credits("fan@example.com", 10).unwrap();
        verified_user(&mut users, "other@example.com");
        users.delete("other@example.com").unwrap();
    }
    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());

    let users = manager(&path);
    assert_eq!(users.list().len(), 1);
    assert_eq!(users.credits_remaining("fan@example.com").unwrap(), FREE_CREDITS - 2 + 10);
    assert!(users.get("other@example.com").is_none());
    let _ = fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn corrupt_store_is_reported() {
    let path = temp_store("corrupt");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(UserManager::load(&path), Err(AccountError::Json(_))));
}

#[test]
fn password_hashes_are_salted() {
    let a = hash_password("hunter22", 10);
    let b = hash_password("hunter22", 10);
    assert_ne!(a, b);
    assert!(a.starts_with("pbkdf2$10$"));
    assert!(verify_password("hunter22", &a));
    assert!(!verify_password("hunter23", &a));
    assert!(!verify_password("hunter22", "plain"));
}
