//! Minimal DOM tree and the panel walker used for services that only render HTML.
//!
//! The walker knows nothing about a particular service: class names, ids and
//! the merge-event phrase come from a [`PanelLayout`].

use scraper::{ElementRef, Html};
use tracing::debug;

use super::BackendError;
use crate::review::{Discussion, Note, Thread};

/// A node of a parsed HTML document. Comments, doctypes and processing
/// instructions are dropped while building the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomNode {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<DomNode>,
    },
    Text(String),
}

impl DomNode {
    /// Parse a full document; the returned node is the `<html>` element.
    pub fn parse_document(source: &str) -> Self {
        let document = Html::parse_document(source);
        Self::from_element(document.root_element())
    }

    fn from_element(element: ElementRef<'_>) -> Self {
        let children = element
            .children()
            .filter_map(|child| match ElementRef::wrap(child) {
                Some(nested) => Some(Self::from_element(nested)),
                None => child.value().as_text().map(|text| Self::Text(String::from(&**text))),
            })
            .collect();
        Self::Element {
            tag: element.value().name().to_string(),
            attrs: element
                .value()
                .attrs()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            children,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Element { tag, .. } => Some(tag),
            Self::Text(_) => None,
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        match self {
            Self::Element { attrs, .. } => attrs
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str()),
            Self::Text(_) => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn children(&self) -> &[DomNode] {
        match self {
            Self::Element { children, .. } => children,
            Self::Text(_) => &[],
        }
    }

    /// This node and everything below it, in document order.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// First element (self included) whose `key` attribute equals `value` exactly.
    pub fn find_by_attr(&self, key: &str, value: &str) -> Option<&DomNode> {
        self.descendants().find(|node| node.attr(key) == Some(value))
    }

    pub fn find_by_id(&self, id: &str) -> Option<&DomNode> {
        self.find_by_attr("id", id)
    }

    /// First element whose whole `class` attribute equals `class`.
    pub fn find_by_class(&self, class: &str) -> Option<&DomNode> {
        self.find_by_attr("class", class)
    }

    /// Whether `class` is one of the element's class tokens.
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|token| token == class))
    }

    /// Direct child elements with the given tag.
    pub fn child_elements<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a DomNode> + 'a {
        self.children().iter().filter(move |child| child.tag() == Some(tag))
    }

    /// Trimmed, non-empty text nodes below this node joined by line breaks.
    pub fn text_content(&self) -> String {
        self.descendants()
            .filter_map(|node| match node {
                Self::Text(text) => Some(text.trim()),
                Self::Element { .. } => None,
            })
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Pre-order traversal over a [`DomNode`] tree.
pub struct Descendants<'a> {
    stack: Vec<&'a DomNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a DomNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().iter().rev());
        Some(node)
    }
}

/// Where the pieces of a comment live in a service's pull request page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelLayout {
    /// id of the container holding every comment panel
    pub comment_list_id: &'static str,
    /// class token marking a comment panel among the container's children
    pub panel_class: &'static str,
    pub heading_class: &'static str,
    pub author_class: &'static str,
    /// body of a flat comment
    pub flat_body_class: &'static str,
    /// container of a thread's entries
    pub thread_body_class: &'static str,
    /// container of an entry's header and body inside a thread
    pub note_body_class: &'static str,
    /// heading element carrying the merge-event phrase
    pub merge_marker_class: &'static str,
    pub merge_marker_phrase: &'static str,
}

impl PanelLayout {
    pub const GITBUCKET: Self = Self {
        comment_list_id: "comment-list",
        panel_class: "panel",
        heading_class: "panel-heading",
        author_class: "username strong",
        flat_body_class: "panel-body markdown-body",
        thread_body_class: "panel-body",
        note_body_class: "markdown-body",
        merge_marker_class: "muted",
        merge_marker_phrase: "referenced the  pull request",
    };

    fn is_merge_event(&self, heading: &DomNode) -> bool {
        heading
            .find_by_class(self.merge_marker_class)
            .is_some_and(|marker| marker.text_content().contains(self.merge_marker_phrase))
    }

    fn author_in(&self, node: Option<&DomNode>) -> String {
        node.and_then(|node| node.find_by_class(self.author_class))
            .map(DomNode::text_content)
            .unwrap_or_default()
    }
}

/// Comments recovered from a pull request page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelPage {
    pub document_author: String,
    pub discussions: Vec<Discussion>,
}

/// Walk the comment panels of a pull request page.
///
/// The first panel is the pull request description and names its author. A
/// later panel with an `id` is a flat comment; one without is a thread whose
/// entries each yield a note. Merge-event panels are skipped. Missing pieces
/// inside a panel become empty strings.
pub fn walk_panels(root: &DomNode, layout: &PanelLayout, page_url: &str) -> Result<PanelPage, BackendError> {
    let list = root
        .find_by_id(layout.comment_list_id)
        .ok_or_else(|| BackendError::Shape(format!("#{} not found in page", layout.comment_list_id)))?;
    let mut panels = list
        .child_elements("div")
        .filter(|div| div.has_class(layout.panel_class));

    let summary = panels
        .next()
        .ok_or_else(|| BackendError::Shape("pull request description panel not found".to_string()))?;
    let document_author = layout.author_in(summary.find_by_class(layout.heading_class));

    let mut discussions = Vec::new();
    for (index, panel) in panels.enumerate() {
        let heading = panel.find_by_class(layout.heading_class);
        if heading.is_some_and(|heading| layout.is_merge_event(heading)) {
            debug!(index, "skipping merge event panel");
            continue;
        }

        let discussion = match panel.id() {
            Some(id) => Discussion::Flat(Note {
                author: layout.author_in(heading),
                body: panel
                    .find_by_class(layout.flat_body_class)
                    .map(DomNode::text_content)
                    .unwrap_or_default(),
                timestamp: None,
                location_ref: format!("{page_url}#{id}"),
                system_generated: false,
            }),
            None => Discussion::Thread(walk_thread(panel, layout, page_url, index)),
        };
        discussions.push(discussion);
    }

    Ok(PanelPage {
        document_author,
        discussions,
    })
}

fn walk_thread(panel: &DomNode, layout: &PanelLayout, page_url: &str, index: usize) -> Thread {
    let entries: Vec<&DomNode> = panel
        .find_by_class(layout.thread_body_class)
        .map(|body| body.child_elements("div").collect())
        .unwrap_or_default();

    let notes = entries
        .iter()
        .map(|entry| {
            let parts: Vec<&DomNode> = entry
                .find_by_class(layout.note_body_class)
                .map(|body| body.child_elements("div").collect())
                .unwrap_or_default();
            Note {
                author: layout.author_in(parts.first().copied()),
                body: parts.get(1).map(|part| part.text_content()).unwrap_or_default(),
                timestamp: None,
                location_ref: match entry.id() {
                    Some(id) => format!("{page_url}#{id}"),
                    None => page_url.to_string(),
                },
                system_generated: false,
            }
        })
        .collect();

    Thread {
        id: entries
            .first()
            .and_then(|entry| entry.id())
            .map(str::to_string)
            .unwrap_or_else(|| format!("panel-{index}")),
        resolved: None,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PULL_PAGE: &str = include_str!("../../tests/fixtures/gitbucket_pull.html");
    const PAGE_URL: &str = "https://gitbucket.example.com/org/repo/pull/7";

    fn walk(source: &str) -> Result<PanelPage, BackendError> {
        walk_panels(&DomNode::parse_document(source), &PanelLayout::GITBUCKET, PAGE_URL)
    }

    #[test]
    fn test_dom_lookups() {
        let root = DomNode::parse_document(
            r#"<html><body><div id="a" class="x y"><p>one</p><span class="y">  two  </span></div><div id="b"></div></body></html>"#,
        );
        let a = root.find_by_id("a").unwrap();
        assert!(a.has_class("x"));
        assert!(a.has_class("y"));
        assert!(!a.has_class("x y"));
        assert_eq!(a.find_by_class("y").and_then(DomNode::tag), Some("span"));
        assert_eq!(a.text_content(), "one\ntwo");
        assert!(root.find_by_id("missing").is_none());

        let body = root.descendants().find(|node| node.tag() == Some("body")).unwrap();
        let ids: Vec<&str> = body.child_elements("div").filter_map(DomNode::id).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_descendants_are_in_document_order() {
        let root = DomNode::parse_document("<html><body><i>1</i><b><u>2</u></b><i>3</i></body></html>");
        assert_eq!(root.text_content(), "1\n2\n3");
    }

    #[test]
    fn test_walk_pull_request_page() {
        let page = walk(PULL_PAGE).unwrap();
        assert_eq!(page.document_author, "alice");
        // description and merge event are not discussions
        assert_eq!(page.discussions.len(), 3);

        let Discussion::Flat(flat) = &page.discussions[0] else {
            panic!("first comment is flat");
        };
        assert_eq!(flat.author, "bob");
        assert_eq!(flat.body, "変数名がわかりにくい\n~~\n修正しました");
        assert_eq!(flat.location_ref, format!("{PAGE_URL}#comment-1"));

        let Discussion::Thread(thread) = &page.discussions[1] else {
            panic!("second comment is a thread");
        };
        assert_eq!(thread.id, "discussion_r5");
        assert_eq!(thread.resolved, None);
        let authors: Vec<&str> = thread.notes.iter().map(|n| n.author.as_str()).collect();
        assert_eq!(authors, ["bob", "alice", "carol"]);
        assert_eq!(thread.notes[0].body, "ここでnullチェックが必要です");
        assert_eq!(thread.notes[0].location_ref, format!("{PAGE_URL}#discussion_r5"));

        let Discussion::Flat(marker) = &page.discussions[2] else {
            panic!("third comment is flat");
        };
        assert!(marker.body.starts_with("- レビュー1回目"));
    }

    #[test]
    fn test_merge_event_panel_contributes_nothing() {
        let page = walk(PULL_PAGE).unwrap();
        assert!(page
            .discussions
            .iter()
            .all(|d| !matches!(d, Discussion::Flat(note) if note.location_ref.ends_with("#comment-3"))));
    }

    #[test]
    fn test_missing_pieces_become_empty() {
        let source = r#"<html><body><div id="comment-list">
            <div class="panel panel-default issue-comment-box"><div class="panel-heading"></div></div>
            <div class="panel panel-default issue-comment-box" id="comment-9"></div>
            <div class="panel panel-default"><div class="panel-body"><div><div class="markdown-body"></div></div></div></div>
        </div></body></html>"#;
        let page = walk(source).unwrap();
        assert_eq!(page.document_author, "");
        assert_eq!(page.discussions.len(), 2);
        let Discussion::Flat(flat) = &page.discussions[0] else {
            panic!("flat comment expected");
        };
        assert_eq!((flat.author.as_str(), flat.body.as_str()), ("", ""));
        let Discussion::Thread(thread) = &page.discussions[1] else {
            panic!("thread expected");
        };
        assert_eq!(thread.id, "panel-1");
        assert_eq!(thread.notes.len(), 1);
        assert_eq!((thread.notes[0].author.as_str(), thread.notes[0].body.as_str()), ("", ""));
    }

    #[test]
    fn test_missing_comment_list_is_an_error() {
        let err = walk("<html><body><p>Sign in</p></body></html>").unwrap_err();
        assert!(matches!(err, BackendError::Shape(_)));
        let err = walk(r#"<html><body><div id="comment-list"></div></body></html>"#).unwrap_err();
        assert!(matches!(err, BackendError::Shape(_)));
    }
}
