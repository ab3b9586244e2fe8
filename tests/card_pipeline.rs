use std::sync::Arc;

use bangumi_card::{
    components::bangumi::lifecycle::{Lifecycle, Slot},
    lint::find_duplicate_ids,
    render_markdown, render_page, simulate, BangumiCard, CardConfig, CardIds, Config,
    FetchOutcome,
};

const DOCUMENT: &str = r#"# Friends

::bangumi{user="sai"}

Some text between cards.

::bangumi{user="sai"}

::bangumi

```
::bangumi{user="in-code"}
```
"#;

#[test]
fn test_document_ids_unique() {
    let content = render_markdown(DOCUMENT, &Config::default()).unwrap();
    assert_eq!(content.matches("class=\"card-bangumi").count(), 2);
    assert!(content.contains(r#"<div class="hidden">Invalid user."#));
    assert!(content.contains("::bangumi{user=&quot;in-code&quot;}"));

    let page = render_page(&Config::default().page, &content).unwrap();
    assert!(find_duplicate_ids(page.as_bytes()).unwrap().is_empty());
}

#[test]
fn test_same_user_twice_is_duplicated_without_allocator() {
    // Two renders with separate allocators restart the sequence.
    let first = render_markdown("::bangumi{user=\"sai\"}", &Config::default()).unwrap();
    let second = render_markdown("::bangumi{user=\"sai\"}", &Config::default()).unwrap();
    let duplicates = find_duplicate_ids(format!("{first}{second}").as_bytes()).unwrap();
    assert!(duplicates.iter().any(|dup| dup.id == "BC0-card"));
}

#[test]
fn test_card_lifecycle_loaded() {
    let card = BangumiCard::new(CardConfig::default(), Arc::new(CardIds::default()))
        .render_card("sai")
        .unwrap();
    let body = r#"{
        "nickname": "Sai",
        "username": "sai",
        "avatar": {"large": "https://lain.bgm.tv/pic/user/l/sai.jpg"},
        "sign": "hello",
        "user_group": 10,
        "id": 1
    }"#;
    let state = simulate(&card, &FetchOutcome::ok(body)).unwrap();

    assert_eq!(state.lifecycle, Lifecycle::Loaded);
    assert_eq!(state.text(Slot::Nickname).as_deref(), Some("Sai"));
    assert_eq!(state.text(Slot::Username).as_deref(), Some("@sai"));
    assert_eq!(state.text(Slot::Sign).as_deref(), Some("hello"));
    assert_eq!(
        state.text(Slot::UserGroup).as_deref(),
        Some("Groups attended: 10")
    );
    assert_eq!(state.text(Slot::UserId).as_deref(), Some("ID: 1"));
    assert_eq!(
        state.style(Slot::Avatar, "background-image").as_deref(),
        Some(r#"url("https://lain.bgm.tv/pic/user/l/sai.jpg")"#)
    );
    assert!(!state.classes().contains(&"fetch-waiting"));
}

#[test]
fn test_card_lifecycle_errored() {
    let card = BangumiCard::new(CardConfig::default(), Arc::new(CardIds::default()))
        .render_card("ghost")
        .unwrap();
    let outcome = FetchOutcome::Response {
        status: 404,
        body: r#"{"title":"Not Found"}"#.into(),
    };
    let state = simulate(&card, &outcome).unwrap();

    assert_eq!(state.lifecycle, Lifecycle::Errored);
    assert_eq!(
        state.text(Slot::Nickname).as_deref(),
        Some("Error loading user")
    );
    assert_eq!(state.text(Slot::Sign).as_deref(), Some(""));
    assert!(state.classes().contains(&"fetch-error"));
    assert!(state.classes().contains(&"fetch-waiting"));
}
