// Request-scoped data model shared by the scorers and the decision engine

use crate::error::ScoreError;
use scraper::{ElementRef, Html, Selector};
use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;

/// Element levels kept when a tree is built from an artifact or from HTML.
/// Elements at this depth are kept as leaves and anything below them is
/// skipped without being materialised.
pub const MAX_TREE_DEPTH: usize = 64;

/// One rendered element: an upper-cased tag and its children in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomNode {
    pub tag: String,
    pub children: Vec<DomChild>,
}

/// A child slot of a [`DomNode`].
///
/// Snapshots occasionally carry children that are not element objects
/// (text, nulls, numbers). They keep their position so the comparator can
/// charge a type-mismatch penalty for them.
#[derive(Debug, Clone, PartialEq)]
pub enum DomChild {
    Element(DomNode),
    Opaque,
}

impl DomNode {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_uppercase(),
            children: Vec::new(),
        }
    }

    pub fn with_children(tag: &str, children: Vec<DomNode>) -> Self {
        Self {
            tag: tag.to_uppercase(),
            children: children.into_iter().map(DomChild::Element).collect(),
        }
    }

    pub fn to_value(&self) -> Value {
        let children = self
            .children
            .iter()
            .map(|child| match child {
                DomChild::Element(node) => node.to_value(),
                DomChild::Opaque => Value::Null,
            })
            .collect();

        let mut object = Map::new();
        object.insert("tag".to_string(), Value::String(self.tag.clone()));
        object.insert("children".to_string(), Value::Array(children));
        Value::Object(object)
    }

    /// Depth of the deepest element below (and including) this node.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children.iter().filter_map(|child| match child {
                DomChild::Element(node) => Some((node, depth + 1)),
                DomChild::Opaque => None,
            }));
        }
        deepest
    }
}

/// A rendered page's element tree plus its title. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomTree {
    pub root: DomNode,
    pub title: Option<String>,
}

impl DomTree {
    pub fn new(root: DomNode, title: Option<String>) -> Self {
        Self { root, title }
    }

    /// Parse a DOM artifact. Accepts the `{title, dom: {...}}` envelope
    /// written by the renderer as well as a bare `{tag, children}` node.
    ///
    /// Nesting is tracked while parsing, so arbitrarily deep artifacts load
    /// with bounded stack use; see [`MAX_TREE_DEPTH`].
    pub fn from_json_str(json: &str) -> Result<Self, ScoreError> {
        let mut deserializer = serde_json::Deserializer::from_str(json);
        deserializer.disable_recursion_limit();
        let artifact = (&mut deserializer).deserialize_map(ArtifactVisitor)?;
        deserializer.end()?;
        artifact.into_tree()
    }

    pub fn load(path: &Path) -> Result<Self, ScoreError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Build a tree from raw HTML, rooted at `<body>`.
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);

        let title = Selector::parse("title").ok().and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
        });

        let body = Selector::parse("body")
            .ok()
            .and_then(|selector| document.select(&selector).next());

        let root = match body {
            Some(body) => element_to_node(body),
            None => DomNode::new("BODY"),
        };

        Self { root, title }
    }

    /// Serialise in the envelope form understood by [`DomTree::from_json_str`].
    pub fn to_json_string(&self) -> Result<String, ScoreError> {
        let mut envelope = Map::new();
        envelope.insert(
            "title".to_string(),
            Value::String(self.title.clone().unwrap_or_default()),
        );
        envelope.insert("dom".to_string(), self.root.to_value());
        Ok(serde_json::to_string_pretty(&Value::Object(envelope))?)
    }
}

struct OpenElement<'a> {
    tag: String,
    pending: std::vec::IntoIter<ElementRef<'a>>,
    children: Vec<DomChild>,
}

impl<'a> OpenElement<'a> {
    fn new(element: ElementRef<'a>, depth: usize) -> Self {
        let pending: Vec<ElementRef<'a>> = if depth < MAX_TREE_DEPTH {
            element.children().filter_map(ElementRef::wrap).collect()
        } else {
            Vec::new()
        };

        Self {
            tag: element.value().name().to_uppercase(),
            pending: pending.into_iter(),
            children: Vec::new(),
        }
    }

    fn close(self) -> DomNode {
        DomNode {
            tag: self.tag,
            children: self.children,
        }
    }
}

// Depth-first with an explicit stack; hostile pages can nest far deeper
// than the native stack allows.
fn element_to_node(root: ElementRef) -> DomNode {
    let mut stack = vec![OpenElement::new(root, 0)];

    while let Some(top) = stack.last_mut() {
        if let Some(child) = top.pending.next() {
            let depth = stack.len();
            stack.push(OpenElement::new(child, depth));
            continue;
        }

        let Some(finished) = stack.pop() else { break };
        let node = finished.close();
        match stack.last_mut() {
            Some(parent) => parent.children.push(DomChild::Element(node)),
            None => return node,
        }
    }

    DomNode::new("BODY")
}

// ----------------------------------------------------------------------------
// Artifact parsing
//
// Artifacts are read straight into `DomNode`s with an explicit depth counter
// instead of going through `serde_json::Value`. Content below
// `MAX_TREE_DEPTH` is drained with `IgnoredAny`, which serde_json skips
// without recursing.
// ----------------------------------------------------------------------------

/// Scalars that carry no structure for the visitor at hand.
macro_rules! scalars_as {
    ($value:expr) => {
        fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
            Ok($value)
        }

        fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
            Ok($value)
        }

        fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
            Ok($value)
        }

        fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
            Ok($value)
        }
    };
}

enum Tag {
    Name(String),
    Invalid,
}

struct TagVisitor;

impl<'de> Visitor<'de> for TagVisitor {
    type Value = Tag;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a tag name")
    }

    scalars_as!(Tag::Invalid);

    fn visit_str<E: de::Error>(self, tag: &str) -> Result<Tag, E> {
        Ok(Tag::Name(tag.to_uppercase()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Tag, E> {
        Ok(Tag::Name(String::new()))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Tag, A::Error> {
        IgnoredAny.visit_seq(seq)?;
        Ok(Tag::Invalid)
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Tag, A::Error> {
        IgnoredAny.visit_map(map)?;
        Ok(Tag::Invalid)
    }
}

struct TitleVisitor;

impl<'de> Visitor<'de> for TitleVisitor {
    type Value = Option<String>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a page title")
    }

    scalars_as!(None);

    fn visit_str<E: de::Error>(self, title: &str) -> Result<Self::Value, E> {
        Ok(Some(title.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Self::Value, A::Error> {
        IgnoredAny.visit_seq(seq)?;
        Ok(None)
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        IgnoredAny.visit_map(map)?;
        Ok(None)
    }
}

/// The `children` of a node at `depth`.
struct ChildrenSeed {
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for ChildrenSeed {
    type Value = Vec<DomChild>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        if self.depth >= MAX_TREE_DEPTH {
            IgnoredAny::deserialize(deserializer)?;
            return Ok(Vec::new());
        }
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ChildrenSeed {
    type Value = Vec<DomChild>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a list of child nodes")
    }

    scalars_as!(Vec::new());

    fn visit_str<E: de::Error>(self, _: &str) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut children = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(child) = seq.next_element_seed(NodeSeed { depth: self.depth + 1 })? {
            children.push(child);
        }
        Ok(children)
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        IgnoredAny.visit_map(map)?;
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct NodeFields {
    tag: Option<Tag>,
    children: Vec<DomChild>,
}

impl NodeFields {
    /// Consume the value for `key` if it is a node field.
    fn read<'de, A: MapAccess<'de>>(
        &mut self,
        key: &str,
        map: &mut A,
        depth: usize,
    ) -> Result<bool, A::Error> {
        match key {
            "tag" => self.tag = Some(map.next_value_seed(TagSeed)?),
            "children" => self.children = map.next_value_seed(ChildrenSeed { depth })?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// `None` when the tag is neither a string nor null.
    fn into_node(self) -> Option<DomNode> {
        let tag = match self.tag {
            None => String::new(),
            Some(Tag::Name(tag)) => tag,
            Some(Tag::Invalid) => return None,
        };
        Some(DomNode {
            tag,
            children: self.children,
        })
    }
}

struct TagSeed;

impl<'de> DeserializeSeed<'de> for TagSeed {
    type Value = Tag;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Tag, D::Error> {
        deserializer.deserialize_any(TagVisitor)
    }
}

/// One child slot at `depth`. Anything but a well-formed node is opaque.
struct NodeSeed {
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for NodeSeed {
    type Value = DomChild;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<DomChild, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for NodeSeed {
    type Value = DomChild;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a {tag, children} node")
    }

    scalars_as!(DomChild::Opaque);

    fn visit_str<E: de::Error>(self, _: &str) -> Result<DomChild, E> {
        Ok(DomChild::Opaque)
    }

    fn visit_unit<E: de::Error>(self) -> Result<DomChild, E> {
        Ok(DomChild::Opaque)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<DomChild, A::Error> {
        IgnoredAny.visit_seq(seq)?;
        Ok(DomChild::Opaque)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<DomChild, A::Error> {
        let mut fields = NodeFields::default();
        while let Some(key) = map.next_key::<String>()? {
            if !fields.read(&key, &mut map, self.depth)? {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(fields.into_node().map_or(DomChild::Opaque, DomChild::Element))
    }
}

/// Top-level artifact: either the renderer envelope or a bare node.
struct Artifact {
    title: Option<String>,
    dom: Option<DomChild>,
    bare: NodeFields,
}

impl Artifact {
    fn into_tree(self) -> Result<DomTree, ScoreError> {
        let root = match self.dom {
            Some(DomChild::Element(node)) => Some(node),
            Some(DomChild::Opaque) => None,
            None => self.bare.into_node(),
        };

        root.map(|root| DomTree::new(root, self.title)).ok_or_else(|| {
            ScoreError::MalformedTree("root is not a {tag, children} object".to_string())
        })
    }
}

struct ArtifactVisitor;

impl<'de> Visitor<'de> for ArtifactVisitor {
    type Value = Artifact;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a DOM artifact object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Artifact, A::Error> {
        let mut artifact = Artifact {
            title: None,
            dom: None,
            bare: NodeFields::default(),
        };

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "title" => artifact.title = map.next_value_seed(TitleSeed)?,
                "dom" => artifact.dom = Some(map.next_value_seed(NodeSeed { depth: 0 })?),
                _ => {
                    if !artifact.bare.read(&key, &mut map, 0)? {
                        map.next_value::<IgnoredAny>()?;
                    }
                }
            }
        }

        Ok(artifact)
    }
}

struct TitleSeed;

impl<'de> DeserializeSeed<'de> for TitleSeed {
    type Value = Option<String>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(TitleVisitor)
    }
}

/// Clamp a score into `[0, 1]`.
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Final binary label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Phishing,
    Legitimate,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Phishing => "Phishing",
            Verdict::Legitimate => "Legitimate",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the brand reference for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStatus {
    /// Reference rendered and both scorers ran against it.
    Scored,
    /// No brand supplied, reported by the URL scorer, or found in the title.
    UnknownBrand,
    /// Brand known but the host does not carry it; comparison skipped.
    OffDomain,
    /// The reference page could not be rendered.
    RenderFailed,
    /// The page under test could not be rendered.
    TestRenderFailed,
}

impl ReferenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceStatus::Scored => "scored",
            ReferenceStatus::UnknownBrand => "unknown_brand",
            ReferenceStatus::OffDomain => "off_domain",
            ReferenceStatus::RenderFailed => "render_failed",
            ReferenceStatus::TestRenderFailed => "test_render_failed",
        }
    }
}

impl fmt::Display for ReferenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record returned for every evaluation.
///
/// Scores keep full precision in memory and are rounded to four decimals
/// only when serialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub url: String,
    pub brand: String,
    pub domain_match: bool,
    #[serde(serialize_with = "round4")]
    pub url_score: f64,
    #[serde(serialize_with = "round4")]
    pub dom_score: f64,
    #[serde(serialize_with = "round4")]
    pub visual_score: f64,
    #[serde(serialize_with = "round4")]
    pub similarity_score: f64,
    #[serde(serialize_with = "round4")]
    pub hybrid_score: f64,
    pub threshold: f64,
    pub final_label: Verdict,
    pub reference: ReferenceStatus,
    pub strategy: String,
}

impl FusionResult {
    pub fn is_phishing(&self) -> bool {
        self.final_label == Verdict::Phishing
    }
}

/// Round to four decimal places for presentation.
pub fn round4_value(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn round4<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round4_value(*value))
}
