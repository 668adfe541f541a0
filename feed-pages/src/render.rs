use axohtml::{dom::DOMTree, elements::FlowContent, html, text};
use chrono::{DateTime, Duration, Utc};

use crate::{AuthorView, CommentHeader, OptionsMenu, PostHeader};

pub fn render_post_header(header: &PostHeader, now: DateTime<Utc>) -> DOMTree<String> {
    let counter = plural(header.comment_count(), "Comment", "Comments");

    html!(
        <div class="post-header">
            <div class="header-author">
                { Some(render_avatar(&header.author)) }
                <div class="header-info">
                    <a class="author-name" href=header.author.uid.to_page_url()>
                        { text!("{}", header.author.display_name) }
                    </a>
                    <div class="header-meta">
                        <span class="counter">{ text!("{}", counter) }</span>
                        <span class="bullet">{ text!("\u{2022}") }</span>
                        { Some(render_timestamp(header.timestamp, now)) }
                    </div>
                </div>
            </div>
            { Some(render_menu(&header.menu)) }
        </div>
    )
}

pub fn render_comment_header(header: &CommentHeader, now: DateTime<Utc>) -> DOMTree<String> {
    let counter = plural(header.reply_count(), "Reply", "Replies");

    html!(
        <div class="comment-header">
            <div class="header-author">
                { Some(render_avatar(&header.author)) }
                <div class="header-info">
                    <a class="author-name" href=header.author.uid.to_page_url()>
                        { text!("{}", header.author.display_name) }
                    </a>
                    <div class="header-meta">
                        { Some(render_timestamp(header.timestamp, now)) }
                        <span class="bullet">{ text!("\u{2022}") }</span>
                        <span class="counter">{ text!("{}", counter) }</span>
                    </div>
                </div>
            </div>
            { Some(render_menu(&header.menu)) }
        </div>
    )
}

fn render_avatar(author: &AuthorView) -> Box<dyn FlowContent<String>> {
    match &author.avatar {
        Some(src) => html!(
            <img class="avatar" src=src.as_str() alt=author.display_name.as_str() />
        ),
        None => html!(
            <span class="avatar avatar-placeholder">{ text!("{}", author.initial()) }</span>
        ),
    }
}

fn render_timestamp(
    timestamp: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Box<dyn FlowContent<String>> {
    let title = timestamp.map(|t| t.to_rfc3339()).unwrap_or_default();

    html!(
        <span class="timestamp" title=title>
            { text!("{}", format_timestamp(timestamp, now)) }
        </span>
    )
}

fn render_menu(menu: &OptionsMenu) -> Box<dyn FlowContent<String>> {
    let items = menu.items();

    let confirm = if menu.confirm_open() {
        Some(html!(
            <div class="confirm-dialog">
                <p class="confirm-prompt">{ text!("{}", menu.confirm_prompt()) }</p>
                <div class="confirm-buttons">
                    <button class="confirm-cancel" title="cancel">{ text!("Cancel") }</button>
                    <button class="confirm-delete" title="confirm-delete">
                        { text!("Delete") }
                    </button>
                </div>
            </div>
        ))
    } else {
        None
    };

    html!(
        <div class="options-menu">
            <ul class="options-menu-items">
                { items.iter().map(|item| html!(
                    <li class="options-menu-item">
                        <button class="menu-button" title=item.action()>
                            { text!("{}", menu.label(*item)) }
                        </button>
                    </li>
                )) }
            </ul>
            { confirm }
        </div>
    )
}

fn plural(count: u64, one: &str, many: &str) -> String {
    if count == 1 {
        format!("{} {}", count, one)
    } else {
        format!("{} {}", count, many)
    }
}

/// Short relative time for recent content, a date for anything older than a week.
pub fn format_timestamp(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let timestamp = match timestamp {
        Some(timestamp) => timestamp,
        None => return String::new(),
    };
    let age = now.signed_duration_since(timestamp);

    if age < Duration::minutes(1) {
        "just now".to_string()
    } else if age < Duration::hours(1) {
        format!("{}m", age.num_minutes())
    } else if age < Duration::days(1) {
        format!("{}h", age.num_hours())
    } else if age < Duration::days(7) {
        format!("{}d", age.num_days())
    } else {
        timestamp.format("%b %-d, %Y").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use feed_core::Viewer;
    use feed_db::Database;
    use feed_ref::DocPath;
    use serde_json::json;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn relative_timestamps() {
        let now = at(12, 0);

        assert_eq!(format_timestamp(None, now), "");
        assert_eq!(format_timestamp(Some(at(11, 59)), now), "1m");
        assert_eq!(format_timestamp(Some(now), now), "just now");
        assert_eq!(format_timestamp(Some(at(12, 5)), now), "just now");
        assert_eq!(format_timestamp(Some(at(9, 0)), now), "3h");
        assert_eq!(format_timestamp(Some(now - Duration::days(2)), now), "2d");
        assert_eq!(
            format_timestamp(Some(now - Duration::days(30)), now),
            "Jan 31, 2024"
        );
    }

    #[test]
    fn plurals() {
        assert_eq!(plural(1, "Reply", "Replies"), "1 Reply");
        assert_eq!(plural(0, "Reply", "Replies"), "0 Replies");
    }

    async fn seeded() -> Database {
        let mut db = Database::in_memory().await.unwrap();
        db.set_doc(&DocPath::User("ada".parse().unwrap()), &json!({}))
            .await
            .unwrap();
        db.set_doc(
            &DocPath::Post("p1".parse().unwrap()),
            &json!({ "authorUid": "ada", "name": "Ada", "timestamp": "2024-03-01T09:00:00Z" }),
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn renders_post_header_for_reader() {
        let mut db = seeded().await;
        db.set_doc(
            &DocPath::User("me".parse().unwrap()),
            &json!({ "blockedUsers": { "ada": true } }),
        )
        .await
        .unwrap();
        let viewer = Viewer::new("me".parse().unwrap());
        let header = PostHeader::load(&mut db, &viewer, &"p1".parse().unwrap())
            .await
            .unwrap();

        let page = render_post_header(&header, at(12, 0)).to_string();

        assert!(page.contains("Ada"));
        assert!(page.contains("0 Comments"));
        assert!(page.contains("3h"));
        assert!(page.contains("/profile/ada"));
        assert!(page.contains("Unblock Ada"));
        assert!(page.contains("Report"));
        assert!(!page.contains("Delete Post"));
    }

    #[tokio::test]
    async fn renders_confirm_dialog_for_author() {
        let mut db = seeded().await;
        let viewer = Viewer::new("ada".parse().unwrap());
        let mut header = PostHeader::load(&mut db, &viewer, &"p1".parse().unwrap())
            .await
            .unwrap();

        let closed = render_post_header(&header, at(12, 0)).to_string();
        assert!(closed.contains("Delete Post"));
        assert!(!closed.contains("confirm-dialog"));

        header
            .menu
            .activate(&mut db, crate::MenuItem::Delete)
            .await;
        let open = render_post_header(&header, at(12, 0)).to_string();
        assert!(open.contains("confirm-dialog"));
        assert!(open.contains("delete your post"));
    }
}
