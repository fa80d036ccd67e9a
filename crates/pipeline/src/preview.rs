//! Read-only previews of what a repair would write.

use std::io::{self, Write};

use mojifix_core::fixer::TextFixer;
use mojifix_core::target::RepairTarget;
use mojifix_core::types::{DbId, RowKey};
use mojifix_db::repositories::{CommentRepo, PostRepo, RepairRepo};
use mojifix_db::DbPool;
use serde::Serialize;

use crate::error::RepairError;

/// Stored and repaired value of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPreview {
    pub original: Option<String>,
    pub fixed: Option<String>,
}

impl FieldPreview {
    pub fn compute(fixer: &TextFixer<'_>, original: Option<&str>) -> Self {
        Self {
            original: original.map(str::to_string),
            fixed: fixer.fix(original),
        }
    }

    pub fn changed(&self) -> bool {
        self.original != self.fixed
    }

    fn render(&self, out: &mut impl Write, label: &str) -> io::Result<()> {
        let original = self.original.as_deref().unwrap_or("<null>");
        if self.changed() {
            let fixed = self.fixed.as_deref().unwrap_or("<null>");
            writeln!(out, "  {label} (original): {original}")?;
            writeln!(out, "  {label} (fixed):    {fixed}")
        } else {
            writeln!(out, "  {label} (unchanged): {original}")
        }
    }
}

// ---------------------------------------------------------------------------
// Single row
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RowPreview {
    pub target: String,
    pub pk: RowKey,
    pub value: FieldPreview,
}

impl RowPreview {
    pub fn render(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{} #{}", self.target, self.pk)?;
        self.value.render(out, "value")
    }
}

/// Preview one row of `target`. `None` when the key does not exist.
pub async fn preview_row(
    pool: &DbPool,
    fixer: &TextFixer<'_>,
    target: &RepairTarget,
    pk: RowKey,
) -> Result<Option<RowPreview>, RepairError> {
    let Some(row) = RepairRepo::find_row(pool, target, pk).await? else {
        return Ok(None);
    };
    Ok(Some(RowPreview {
        target: target.qualified(),
        pk: row.pk,
        value: FieldPreview::compute(fixer, row.text.as_deref()),
    }))
}

// ---------------------------------------------------------------------------
// Whole thread
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CommentPreview {
    pub id: DbId,
    pub author: FieldPreview,
    pub content: FieldPreview,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostPreview {
    pub post_id: DbId,
    pub title: FieldPreview,
    pub comments: Vec<CommentPreview>,
}

impl PostPreview {
    /// Number of fields the repair would change.
    pub fn changed_fields(&self) -> usize {
        let comment_fields = self
            .comments
            .iter()
            .map(|c| usize::from(c.author.changed()) + usize::from(c.content.changed()))
            .sum::<usize>();
        usize::from(self.title.changed()) + comment_fields
    }

    pub fn render(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "Post #{}", self.post_id)?;
        self.title.render(out, "title")?;
        for comment in &self.comments {
            writeln!(out, "Comment #{}", comment.id)?;
            comment.author.render(out, "author")?;
            comment.content.render(out, "content")?;
        }
        writeln!(
            out,
            "{} comment(s), {} field(s) would change",
            self.comments.len(),
            self.changed_fields()
        )
    }
}

/// Preview a post title together with every comment's author and content.
pub async fn preview_post(
    pool: &DbPool,
    fixer: &TextFixer<'_>,
    post_id: DbId,
) -> Result<Option<PostPreview>, RepairError> {
    let Some(post) = PostRepo::find_by_id(pool, post_id).await? else {
        return Ok(None);
    };
    let comments = CommentRepo::list_by_post(pool, post_id)
        .await?
        .into_iter()
        .map(|c| CommentPreview {
            id: c.id,
            author: FieldPreview::compute(fixer, Some(&c.author)),
            content: FieldPreview::compute(fixer, Some(&c.content)),
        })
        .collect();

    Ok(Some(PostPreview {
        post_id: post.id,
        title: FieldPreview::compute(fixer, Some(&post.title)),
        comments,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use mojifix_core::replacement_map::ReplacementMap;

    use super::*;

    fn map() -> ReplacementMap {
        ReplacementMap::builder().substring("Ã¶", "ö").build().unwrap()
    }

    #[test]
    fn field_preview_marks_changes() {
        let map = map();
        let fixer = TextFixer::new(&map);
        assert!(FieldPreview::compute(&fixer, Some("gÃ¶z")).changed());
        assert!(!FieldPreview::compute(&fixer, Some("göz")).changed());
        assert!(!FieldPreview::compute(&fixer, None).changed());
    }

    #[test]
    fn post_preview_renders_both_versions() {
        let map = map();
        let fixer = TextFixer::new(&map);
        let preview = PostPreview {
            post_id: 7,
            title: FieldPreview::compute(&fixer, Some("BaÅŸlÄ±k")),
            comments: vec![CommentPreview {
                id: 70,
                author: FieldPreview::compute(&fixer, Some("gÃ¶khan")),
                content: FieldPreview::compute(&fixer, Some("ok")),
            }],
        };
        assert_eq!(preview.changed_fields(), 1);

        let mut out = Vec::new();
        preview.render(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("author (original): gÃ¶khan"));
        assert!(text.contains("author (fixed):    gökhan"));
        assert!(text.contains("content (unchanged): ok"));
        assert!(text.ends_with("1 comment(s), 1 field(s) would change\n"));
    }

    #[test]
    fn row_preview_renders_null() {
        let preview = RowPreview {
            target: "posts.title".into(),
            pk: 3,
            value: FieldPreview { original: None, fixed: None },
        };
        let mut out = Vec::new();
        preview.render(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "posts.title #3\n  value (unchanged): <null>\n");
    }
}
