//! ComfyUI workflow graph model (API format).
//!
//! A workflow is an ordered map from node ID to [`WorkflowNode`]:
//!
//! ```json
//! {
//!   "3": {
//!     "class_type": "KSampler",
//!     "inputs": { "seed": 42, "model": ["1", 0] },
//!     "_meta": { "title": "KSampler" }
//!   }
//! }
//! ```
//!
//! Node order follows the input JSON, so "first node of a role" is
//! well-defined. Input values are either literals or [`NodeLink`] edge
//! references encoded as `[source_node_id, output_slot]`.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Node identifier (string key of the workflow JSON object).
pub type NodeId = String;

// ---------------------------------------------------------------------------
// Edge references and input values
// ---------------------------------------------------------------------------

/// Reference to one output slot of another node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeLink {
    /// Producer node ID.
    pub node: NodeId,
    /// Output slot index on the producer.
    pub slot: u32,
}

impl NodeLink {
    pub fn new(node: impl Into<NodeId>, slot: u32) -> Self {
        Self {
            node: node.into(),
            slot,
        }
    }
}

impl fmt::Display for NodeLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.slot)
    }
}

/// A single node input: either a literal JSON value or an edge reference.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Link(NodeLink),
    Literal(Value),
}

impl InputValue {
    /// Wrap any JSON-convertible value as a literal input.
    pub fn literal(value: impl Into<Value>) -> Self {
        InputValue::Literal(value.into())
    }

    pub fn as_link(&self) -> Option<&NodeLink> {
        match self {
            InputValue::Link(link) => Some(link),
            InputValue::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            InputValue::Literal(value) => Some(value),
            InputValue::Link(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_literal().and_then(Value::as_str)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_literal().and_then(Value::as_f64)
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_literal().and_then(Value::as_u64)
    }
}

impl From<NodeLink> for InputValue {
    fn from(link: NodeLink) -> Self {
        InputValue::Link(link)
    }
}

impl From<Value> for InputValue {
    /// ComfyUI encodes connections as `[source_node_id, output_index]`.
    /// Any other shape, including two-element arrays that do not match,
    /// stays a literal so it round-trips unchanged.
    fn from(value: Value) -> Self {
        if let Value::Array(items) = &value {
            if items.len() == 2 {
                if let (Some(node), Some(slot)) = (items[0].as_str(), items[1].as_u64()) {
                    if let Ok(slot) = u32::try_from(slot) {
                        return InputValue::Link(NodeLink::new(node, slot));
                    }
                }
            }
        }
        InputValue::Literal(value)
    }
}

impl Serialize for InputValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            InputValue::Link(link) => (&link.node, link.slot).serialize(serializer),
            InputValue::Literal(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for InputValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(InputValue::from)
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Free-form node metadata. Only `title` is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single node in a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Named inputs, in their original order.
    pub inputs: IndexMap<String, InputValue>,
    /// ComfyUI class type (e.g. "KSampler", "CLIPTextEncode").
    pub class_type: String,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<NodeMeta>,
    /// Any other top-level node fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkflowNode {
    /// Create a node with no inputs and no metadata.
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            inputs: IndexMap::new(),
            class_type: class_type.into(),
            meta: None,
            extra: Map::new(),
        }
    }

    /// Builder-style: set the `_meta.title`.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.meta.get_or_insert_with(NodeMeta::default).title = Some(title.into());
        self
    }

    /// Builder-style: add or replace an input.
    pub fn with_input(mut self, name: &str, value: impl Into<InputValue>) -> Self {
        self.set_input(name, value);
        self
    }

    /// Builder-style: add or replace a literal input.
    pub fn with_literal(self, name: &str, value: impl Into<Value>) -> Self {
        self.with_input(name, InputValue::literal(value))
    }

    pub fn title(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.title.as_deref())
    }

    pub fn input(&self, name: &str) -> Option<&InputValue> {
        self.inputs.get(name)
    }

    /// The edge reference stored under `name`, if that input is a link.
    pub fn link(&self, name: &str) -> Option<&NodeLink> {
        self.input(name).and_then(InputValue::as_link)
    }

    pub fn set_input(&mut self, name: &str, value: impl Into<InputValue>) {
        self.inputs.insert(name.to_string(), value.into());
    }

    pub fn set_literal(&mut self, name: &str, value: impl Into<Value>) {
        self.set_input(name, InputValue::literal(value));
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// An ordered mapping from node ID to node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workflow {
    nodes: IndexMap<NodeId, WorkflowNode>,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut WorkflowNode> {
        self.nodes.get_mut(id)
    }

    /// Insert a node, replacing any node with the same ID in place.
    pub fn insert(&mut self, id: impl Into<NodeId>, node: WorkflowNode) {
        self.nodes.insert(id.into(), node);
    }

    /// Remove a node, keeping the relative order of the remaining nodes.
    pub fn remove(&mut self, id: &str) -> Option<WorkflowNode> {
        self.nodes.shift_remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &WorkflowNode)> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&NodeId, &mut WorkflowNode)> {
        self.nodes.iter_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// ID of the first node (in iteration order) matching `predicate`.
    pub fn find_first(&self, predicate: impl Fn(&WorkflowNode) -> bool) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, node)| predicate(node))
            .map(|(id, _)| id.clone())
    }

    /// IDs of every node matching `predicate`, in iteration order.
    pub fn find_all(&self, predicate: impl Fn(&WorkflowNode) -> bool) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, node)| predicate(node))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Every edge reference in the workflow as `(consumer_id, input_name, link)`.
    pub fn links(&self) -> Vec<(NodeId, String, NodeLink)> {
        let mut links = Vec::new();
        for (id, node) in &self.nodes {
            for (input_name, value) in &node.inputs {
                if let InputValue::Link(link) = value {
                    links.push((id.clone(), input_name.clone(), link.clone()));
                }
            }
        }
        links
    }

    /// Edge references whose producer is not in the workflow.
    pub fn dangling_links(&self) -> Vec<(NodeId, String, NodeLink)> {
        self.links()
            .into_iter()
            .filter(|(_, _, link)| !self.contains(&link.node))
            .collect()
    }

    /// Serialize into the plain JSON shape expected by ComfyUI.
    pub fn to_value(&self) -> Result<Value, CoreError> {
        serde_json::to_value(self)
            .map_err(|e| CoreError::Internal(format!("Failed to serialize workflow JSON: {e}")))
    }

    /// Short human-readable description of what the workflow does.
    pub fn summary(&self) -> String {
        let has = |class: &str| self.nodes.values().any(|n| n.class_type == class);

        let mut parts = Vec::new();
        if has("KSampler") {
            parts.push("generation");
        }
        if has("LoadImage") {
            parts.push("img2img");
        }
        if has("UNETLoader") {
            parts.push("custom model");
        }
        if has("LoraLoader") {
            parts.push("with LoRA");
        }

        if parts.is_empty() {
            "workflow".to_string()
        } else {
            parts.join(", ")
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse and validate a workflow from caller-supplied JSON.
///
/// Accepts either a JSON object or a string containing one. Every node must
/// be an object with a string `class_type` and an object `inputs`.
pub fn parse_workflow(json: &Value) -> Result<Workflow, CoreError> {
    if let Some(text) = json.as_str() {
        let parsed: Value = serde_json::from_str(text).map_err(|e| {
            CoreError::Validation(format!("Workflow string is not valid JSON: {e}"))
        })?;
        return parse_workflow(&parsed);
    }

    let obj = json
        .as_object()
        .ok_or_else(|| CoreError::Validation("Workflow JSON must be an object".to_string()))?;

    if obj.is_empty() {
        return Err(CoreError::Validation(
            "Workflow JSON must contain at least one node".to_string(),
        ));
    }

    for (node_id, node_value) in obj {
        if !node_value.is_object() {
            return Err(CoreError::Validation(format!(
                "Node '{node_id}' must be an object"
            )));
        }
        if node_value.get("class_type").and_then(Value::as_str).is_none() {
            return Err(CoreError::Validation(format!(
                "Node '{node_id}' is missing required 'class_type' field"
            )));
        }
        if !node_value.get("inputs").is_some_and(Value::is_object) {
            return Err(CoreError::Validation(format!(
                "Node '{node_id}' is missing required 'inputs' object"
            )));
        }
    }

    serde_json::from_value(json.clone())
        .map_err(|e| CoreError::Validation(format!("Malformed workflow JSON: {e}")))
}

// ---------------------------------------------------------------------------
// Node ID allocation
// ---------------------------------------------------------------------------

/// Hands out node IDs that are guaranteed not to collide with any ID already
/// present in a workflow, or with any ID handed out earlier by the same
/// allocator.
///
/// IDs are decimal strings starting one past the largest numeric ID in the
/// workflow, so a template's fixed nodes `1..=6` are followed by `7, 8, ...`.
/// Existing IDs are read as `u64`; the counter is wider so an ID of
/// `u64::MAX` is followed by `18446744073709551616` rather than overflowing.
#[derive(Debug)]
pub struct IdAllocator {
    next: u128,
    taken: HashSet<NodeId>,
}

impl IdAllocator {
    pub fn for_workflow(workflow: &Workflow) -> Self {
        let taken: HashSet<NodeId> = workflow.ids().cloned().collect();
        let max = taken
            .iter()
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Self {
            next: u128::from(max) + 1,
            taken,
        }
    }

    pub fn next_id(&mut self) -> NodeId {
        loop {
            let candidate = self.next.to_string();
            self.next += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn sample_workflow_json() -> Value {
        json!({
            "4": {
                "class_type": "CheckpointLoaderSimple",
                "inputs": { "ckpt_name": "sd_xl_base_1.0.safetensors" },
                "_meta": { "title": "Load Checkpoint" }
            },
            "6": {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": "a beautiful landscape", "clip": ["4", 1] },
                "_meta": { "title": "CLIP Text Encode (Positive Prompt)" }
            },
            "3": {
                "class_type": "KSampler",
                "inputs": {
                    "seed": 42,
                    "model": ["4", 0],
                    "positive": ["6", 0]
                },
                "is_changed": ["abc"]
            }
        })
    }

    // -- parse_workflow -------------------------------------------------------

    #[test]
    fn parse_preserves_node_order() {
        let workflow = parse_workflow(&sample_workflow_json()).unwrap();
        let ids: Vec<_> = workflow.ids().cloned().collect();
        assert_eq!(ids, vec!["4", "6", "3"]);
    }

    #[test]
    fn parse_detects_links() {
        let workflow = parse_workflow(&sample_workflow_json()).unwrap();
        let sampler = workflow.get("3").unwrap();
        assert_eq!(sampler.link("model"), Some(&NodeLink::new("4", 0)));
        assert_eq!(sampler.input("seed").and_then(InputValue::as_u64), Some(42));
        assert_eq!(workflow.links().len(), 3);
    }

    #[test]
    fn parse_accepts_json_string() {
        let text = sample_workflow_json().to_string();
        let workflow = parse_workflow(&Value::String(text)).unwrap();
        assert_eq!(workflow.len(), 3);
    }

    #[test]
    fn parse_empty_object_returns_error() {
        let err = parse_workflow(&json!({})).unwrap_err();
        assert_matches!(err, CoreError::Validation(_));
        assert!(err.to_string().contains("at least one node"));
    }

    #[test]
    fn parse_non_object_returns_error() {
        let err = parse_workflow(&json!(42)).unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn parse_invalid_json_string_returns_error() {
        let err = parse_workflow(&json!("{not json")).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn parse_node_missing_class_type_returns_error() {
        let err = parse_workflow(&json!({ "1": { "inputs": {} } })).unwrap_err();
        assert!(err.to_string().contains("class_type"));
    }

    #[test]
    fn parse_node_missing_inputs_returns_error() {
        let err = parse_workflow(&json!({ "1": { "class_type": "SaveImage" } })).unwrap_err();
        assert!(err.to_string().contains("inputs"));
    }

    // -- round trip -----------------------------------------------------------

    #[test]
    fn serialization_round_trip_is_lossless() {
        let original = sample_workflow_json();
        let workflow = parse_workflow(&original).unwrap();
        assert_eq!(workflow.to_value().unwrap(), original);
    }

    #[test]
    fn two_element_literal_arrays_stay_literals() {
        let value = InputValue::from(json!([1, 2]));
        assert_matches!(value, InputValue::Literal(_));

        let value = InputValue::from(json!(["a", -1]));
        assert_matches!(value, InputValue::Literal(_));

        let value = InputValue::from(json!(["a", 1, 2]));
        assert_matches!(value, InputValue::Literal(_));
    }

    #[test]
    fn link_serializes_as_pair() {
        let value = serde_json::to_value(InputValue::from(NodeLink::new("12", 1))).unwrap();
        assert_eq!(value, json!(["12", 1]));
    }

    // -- queries --------------------------------------------------------------

    #[test]
    fn remove_keeps_order_of_remaining_nodes() {
        let mut workflow = parse_workflow(&sample_workflow_json()).unwrap();
        workflow.remove("6");
        let ids: Vec<_> = workflow.ids().cloned().collect();
        assert_eq!(ids, vec!["4", "3"]);
        assert_eq!(workflow.dangling_links().len(), 1);
    }

    #[test]
    fn summary_lists_features() {
        let workflow = parse_workflow(&sample_workflow_json()).unwrap();
        assert_eq!(workflow.summary(), "generation");

        let bare = parse_workflow(&json!({ "1": { "class_type": "SaveImage", "inputs": {} } }))
            .unwrap();
        assert_eq!(bare.summary(), "workflow");
    }

    // -- IdAllocator ----------------------------------------------------------

    #[test]
    fn allocator_starts_past_largest_numeric_id() {
        let workflow = parse_workflow(&sample_workflow_json()).unwrap();
        let mut ids = IdAllocator::for_workflow(&workflow);
        assert_eq!(ids.next_id(), "7");
        assert_eq!(ids.next_id(), "8");
    }

    #[test]
    fn allocator_on_empty_workflow_starts_at_one() {
        let mut ids = IdAllocator::for_workflow(&Workflow::new());
        assert_eq!(ids.next_id(), "1");
    }

    #[test]
    fn allocator_ignores_non_numeric_ids() {
        let mut workflow = Workflow::new();
        workflow.insert("sampler", WorkflowNode::new("KSampler"));
        workflow.insert("2", WorkflowNode::new("SaveImage"));
        let mut ids = IdAllocator::for_workflow(&workflow);
        let fresh = ids.next_id();
        assert_eq!(fresh, "3");
        assert!(!workflow.contains(&fresh));
    }

    #[test]
    fn allocator_handles_max_u64_id() {
        let mut workflow = Workflow::new();
        workflow.insert("18446744073709551615", WorkflowNode::new("KSampler"));
        let mut ids = IdAllocator::for_workflow(&workflow);
        assert_eq!(ids.next_id(), "18446744073709551616");
        assert_eq!(ids.next_id(), "18446744073709551617");
    }
}
