use crate::upsert::ContentComparable;
use serde::{Deserialize, Serialize};

/// Group food order, one document per distinct item. `user_ids` lists who
/// joined the order; the same user may appear more than once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FoodOrder {
    pub item_description: String,
    pub count: u32,
    pub user_ids: Vec<String>,
}

impl ContentComparable for FoodOrder {
    fn content_equals(&self, other: &Self) -> bool {
        self.item_description == other.item_description
            && self.count == other.count
            && self.user_ids == other.user_ids
    }
}

/// Editorial post as mirrored into the document store. `ext_id` is the
/// upstream CMS id; timestamps stay in the upstream's string form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub ext_id: i64,
    pub title: String,
    pub content_html: String,
    pub image_url: Option<String>,
    pub published: String,
}

impl ContentComparable for Post {
    fn content_equals(&self, other: &Self) -> bool {
        self.ext_id == other.ext_id
            && self.title == other.title
            && self.content_html == other.content_html
            && self.image_url == other.image_url
            && self.published == other.published
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn food_order_content_equality_covers_all_domain_fields() {
        let base = FoodOrder {
            item_description: "Pizza".into(),
            count: 2,
            user_ids: vec!["u1".into()],
        };
        assert!(base.content_equals(&base.clone()));

        let mut changed = base.clone();
        changed.count = 3;
        assert!(!base.content_equals(&changed));

        let mut changed = base.clone();
        changed.user_ids.push("u2".into());
        assert!(!base.content_equals(&changed));
    }

    #[test]
    fn post_content_equality_detects_edits() {
        let base = Post {
            ext_id: 10,
            title: "Sommerlager".into(),
            content_html: "<p>Info</p>".into(),
            image_url: None,
            published: "2024-07-01T10:00:00".into(),
        };
        assert!(base.content_equals(&base.clone()));

        let mut edited = base.clone();
        edited.content_html = "<p>Updated</p>".into();
        assert!(!base.content_equals(&edited));
    }
}
