use phone_otp_auth::{AuthError, RedisUserStore, User, UserStore};
use uuid::Uuid;

fn redis_url() -> String {
    if let Ok(url) = std::env::var("REDIS_URL") {
        return url;
    }
    match std::env::var("REDIS_HOST") {
        Ok(host) => format!("redis://{}:6379/", host),
        Err(_) => "redis://127.0.0.1/".to_string(),
    }
}

#[tokio::test]
#[ignore = "needs a running Redis server"]
async fn test_redis_user_round_trip() {
    let store = RedisUserStore::new(&redis_url()).unwrap();
    // Random suffix keeps reruns from colliding.
    let phone = format!("+1555{:07}", Uuid::new_v4().as_u128() % 10_000_000);

    let mut user = User::new("Asha", &phone);
    store.insert(user.clone()).await.unwrap();
    assert!(matches!(
        store.insert(user.clone()).await,
        Err(AuthError::StorageError(_))
    ));

    user.otp.code = Some("042917".to_string());
    user.otp_request_count.count = 2;
    store.save(&user).await.unwrap();

    let loaded = store.find_by_phone(&phone).await.unwrap().unwrap();
    assert_eq!(loaded.otp.code.as_deref(), Some("042917"));
    assert_eq!(loaded.otp_request_count.count, 2);
}
