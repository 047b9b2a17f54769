use serde::Deserialize;
use serde::Serialize;

use crate::geometry::Rect;

/// One node of an accessibility tree dump as delivered by the device collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiNode {
    pub class: String,
    pub text: String,
    #[serde(rename = "content-desc")]
    pub content_desc: String,
    pub bounds: String,
    pub children: Vec<UiNode>,
}

impl UiNode {
    /// Class name without its package prefix (`android.widget.TextView` -> `TextView`).
    pub fn short_class(&self) -> &str {
        short_class(&self.class)
    }

    pub fn rect(&self) -> Option<Rect> {
        Rect::parse(&self.bounds)
    }

    pub fn is_image(&self) -> bool {
        self.short_class().ends_with("ImageView") || self.short_class() == "Image"
    }

    /// Nodes worth classifying: visible text, a description, or a bare image.
    pub fn is_content_bearing(&self) -> bool {
        !self.text.trim().is_empty() || !self.content_desc.trim().is_empty() || self.is_image()
    }
}

pub fn short_class(class: &str) -> &str {
    class.rsplit('.').next().unwrap_or(class)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathStep {
    pub tag: String,
    pub position: usize,
}

/// Ordered `(tag, sibling-position)` steps from the nearest cell root down to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StructuralPath(pub Vec<PathStep>);

impl StructuralPath {
    pub fn child(&self, tag: &str, position: usize) -> Self {
        let mut steps = self.0.clone();
        steps.push(PathStep {
            tag: tag.to_string(),
            position,
        });
        Self(steps)
    }

    /// `Tag[i]/Tag[j]` form used as the role-table key. The cell root itself is `.`.
    pub fn normalized(&self) -> String {
        if self.0.is_empty() {
            return ".".to_string();
        }
        self.0
            .iter()
            .map(|step| format!("{}[{}]", step.tag, step.position))
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNode {
    pub class: String,
    pub text: String,
    pub content_desc: String,
    pub bounds: Option<Rect>,
    pub path: StructuralPath,
}

impl RawNode {
    /// Text if present, otherwise the content description.
    pub fn label(&self) -> &str {
        let text = self.text.trim();
        if text.is_empty() {
            self.content_desc.trim()
        } else {
            text
        }
    }
}

/// Flattens the content-bearing descendants of a cell in document order.
pub fn flatten_cell(cell: &UiNode) -> Vec<RawNode> {
    let mut out = Vec::new();
    collect(cell, StructuralPath::default(), &mut out);
    out
}

fn collect(node: &UiNode, path: StructuralPath, out: &mut Vec<RawNode>) {
    if node.is_content_bearing() {
        out.push(RawNode {
            class: node.short_class().to_string(),
            text: node.text.clone(),
            content_desc: node.content_desc.clone(),
            bounds: node.rect(),
            path: path.clone(),
        });
    }
    for (position, child) in node.children.iter().enumerate() {
        collect(child, path.child(child.short_class(), position), out);
    }
}

/// Locates the scrolling list container: the first node (pre-order) whose short class is one
/// of `list_classes`, preferring the one with the most children when several exist.
pub fn find_list<'a>(root: &'a UiNode, list_classes: &[String]) -> Option<&'a UiNode> {
    let mut best: Option<&UiNode> = None;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if list_classes.iter().any(|class| class == node.short_class()) {
            let better = best.map_or(true, |current| node.children.len() > current.children.len());
            if better {
                best = Some(node);
            }
        }
        for child in node.children.iter().rev() {
            stack.push(child);
        }
    }
    best
}

/// A parsed capture: the list container, its viewport and its cells in on-screen order.
#[derive(Debug, Clone)]
pub struct ListCapture<'a> {
    pub list: &'a UiNode,
    pub viewport: Rect,
    pub cells: Vec<&'a UiNode>,
}

pub fn list_capture<'a>(root: &'a UiNode, list_classes: &[String]) -> Option<ListCapture<'a>> {
    let list = find_list(root, list_classes)?;
    let viewport = list.rect().or_else(|| root.rect())?;
    let mut cells: Vec<&UiNode> = list.children.iter().collect();
    cells.sort_by_key(|cell| cell.rect().map_or(i32::MAX, |rect| rect.top));
    Some(ListCapture {
        list,
        viewport,
        cells,
    })
}
