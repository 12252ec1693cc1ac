//! Layer Analysis - Complexity, Cross-Layer Checks, Optimization, Grouping
//!
//! Analyses are cached per layer identity: id, content signature and canvas
//! size. Layers that share an id but differ in content never share an entry.
//! Entries are never evicted automatically; [`LayerAnalyzer::invalidate_layer`]
//! and [`LayerAnalyzer::clear_cache`] release them.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::canvas::{closest_ratio, Rect};
use crate::config::LayerThresholds;
use crate::document::{CommandKind, UnifiedLayer};
use crate::hashing::{canonical_json, content_signature};
use crate::mapper::CoordinateMapper;
use crate::regions::RegionResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerAnalysis {
    pub layer_id: String,
    pub path_count: usize,
    pub command_count: usize,
    pub complexity: Complexity,
    pub regions: Vec<String>,
    pub anchors: Vec<String>,
    /// Box over all non-`Z` command coordinates.
    pub bounds: Option<Rect>,
    /// Box the layer's own layout resolves to.
    pub layout_bounds: Option<Rect>,
    pub estimated_render_time_ms: f64,
    pub estimated_memory_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeProposal {
    /// Layer that receives the paths.
    pub target: String,
    pub merged: Vec<String>,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub layers: Vec<UnifiedLayer>,
    pub removed_layers: Vec<String>,
    pub merges: Vec<MergeProposal>,
    pub original_layer_count: usize,
    pub optimized_layer_count: usize,
    /// Removed layers as a percentage of the original count.
    pub performance_gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub layer_id: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub dependencies: Vec<String>,
    pub depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerHierarchy {
    pub nodes: Vec<HierarchyNode>,
    pub roots: Vec<String>,
}

impl LayerHierarchy {
    pub fn node(&self, layer_id: &str) -> Option<&HierarchyNode> {
        self.nodes.iter().find(|n| n.layer_id == layer_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Region,
    Semantic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerGroup {
    pub name: String,
    pub kind: GroupKind,
    pub layer_ids: Vec<String>,
    /// Higher renders later / matters more downstream.
    pub priority: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerStatistics {
    pub layer_count: usize,
    pub path_count: usize,
    pub command_count: usize,
    pub average_paths_per_layer: f64,
    pub average_commands_per_path: f64,
    pub complexity_distribution: BTreeMap<Complexity, usize>,
    pub regions_used: Vec<String>,
    pub estimated_render_time_ms: f64,
    pub estimated_memory_bytes: u64,
}

/// Semantic purposes matched against layer labels and ids.
const PURPOSES: [(&str, i32, &[&str]); 4] = [
    ("subject", 90, &["main", "subject", "character", "object", "foreground", "figure", "shape"]),
    ("text", 80, &["text", "label", "title", "caption"]),
    ("decoration", 60, &["detail", "decor", "accent", "ornament", "pattern", "highlight"]),
    ("background", 40, &["background", "bg", "sky", "backdrop", "ground"]),
];

const GENERIC_NAMES: [&str; 5] = ["layer", "untitled", "group", "new layer", "path"];

/// Semantic purpose of a layer from its label and id, if any.
pub fn layer_purpose(layer: &UnifiedLayer) -> Option<&'static str> {
    let text = format!("{} {}", layer.label, layer.id).to_lowercase();
    PURPOSES
        .iter()
        .find(|(_, _, words)| words.iter().any(|w| text.contains(w)))
        .map(|(name, _, _)| *name)
}

/// Layer id, content signature, canvas width and height bits.
type AnalysisKey = (String, String, u64, u64);

pub struct LayerAnalyzer {
    thresholds: LayerThresholds,
    resolver: RegionResolver,
    analysis_cache: HashMap<AnalysisKey, LayerAnalysis>,
    optimization_cache: HashMap<String, OptimizationResult>,
}

impl LayerAnalyzer {
    pub fn new() -> Self {
        Self::with_thresholds(LayerThresholds::default())
    }

    pub fn with_thresholds(thresholds: LayerThresholds) -> Self {
        Self {
            thresholds,
            resolver: RegionResolver::default(),
            analysis_cache: HashMap::new(),
            optimization_cache: HashMap::new(),
        }
    }

    /// Region lookups (including custom regions) go through `resolver`.
    pub fn with_resolver(mut self, resolver: RegionResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn clear_cache(&mut self) {
        self.analysis_cache.clear();
        self.optimization_cache.clear();
    }

    pub fn invalidate_layer(&mut self, layer_id: &str) {
        self.analysis_cache.retain(|(id, _, _, _), _| id != layer_id);
    }

    pub fn cached_analyses(&self) -> usize {
        self.analysis_cache.len()
    }

    fn complexity(&self, commands: usize) -> Complexity {
        if commands < self.thresholds.low_complexity_commands {
            Complexity::Low
        } else if commands < self.thresholds.medium_complexity_commands {
            Complexity::Medium
        } else {
            Complexity::High
        }
    }

    pub fn analyze_layer(&mut self, layer: &UnifiedLayer, canvas_width: f64, canvas_height: f64) -> LayerAnalysis {
        let key = content_signature(layer)
            .map(|signature| (layer.id.clone(), signature, canvas_width.to_bits(), canvas_height.to_bits()))
            .map_err(|e| debug!("layer '{}' not cacheable: {}", layer.id, e))
            .ok();
        if let Some(hit) = key.as_ref().and_then(|k| self.analysis_cache.get(k)) {
            return hit.clone();
        }

        let command_count = layer.command_count();
        let layout_bounds = layer.layout.as_ref().and_then(|spec| {
            let mut resolver = self.resolver.clone();
            resolver.update_aspect_ratio(closest_ratio(canvas_width, canvas_height));
            CoordinateMapper::new(resolver)
                .calculate_position(spec)
                .ok()
                .map(|p| p.bounds)
        });

        let analysis = LayerAnalysis {
            layer_id: layer.id.clone(),
            path_count: layer.paths.len(),
            command_count,
            complexity: self.complexity(command_count),
            regions: layer.regions().into_iter().collect(),
            anchors: layer.anchors().into_iter().collect(),
            bounds: coordinate_bounds(layer),
            layout_bounds,
            estimated_render_time_ms: command_count as f64 * self.thresholds.render_ms_per_command,
            estimated_memory_bytes: command_count as u64 * self.thresholds.bytes_per_command,
        };
        if let Some(key) = key {
            self.analysis_cache.insert(key, analysis.clone());
        }
        analysis
    }

    /// Cross-layer checks. Only duplicates, missing ids and unknown regions
    /// make the result invalid.
    pub fn validate_layers(&self, layers: &[UnifiedLayer]) -> LayerValidation {
        let mut result = LayerValidation::default();
        let mut seen = HashSet::new();

        if layers.len() > self.thresholds.max_layers {
            result.warnings.push(format!(
                "Too many layers: {} (recommended at most {})",
                layers.len(),
                self.thresholds.max_layers
            ));
        }

        for (i, layer) in layers.iter().enumerate() {
            if layer.id.trim().is_empty() {
                result.errors.push(format!("Layer at index {} is missing an ID", i));
            } else if !seen.insert(layer.id.as_str()) {
                result.errors.push(format!("Duplicate layer ID: {}", layer.id));
            }

            if layer.paths.is_empty() {
                result.warnings.push(format!("Layer '{}' is empty", layer.id));
            } else if layer.paths.len() > self.thresholds.max_paths_per_layer {
                result.warnings.push(format!(
                    "Layer '{}' has {} paths (recommended at most {})",
                    layer.id,
                    layer.paths.len(),
                    self.thresholds.max_paths_per_layer
                ));
            }

            let mut path_ids = HashSet::new();
            for (pi, path) in layer.paths.iter().enumerate() {
                if path.id.trim().is_empty() {
                    result.errors.push(format!("Path at index {} in layer '{}' is missing an ID", pi, layer.id));
                } else if !path_ids.insert(path.id.as_str()) {
                    result.errors.push(format!("Duplicate path ID: {} in layer '{}'", path.id, layer.id));
                }
                if path.commands.is_empty() {
                    result.warnings.push(format!("Path '{}' in layer '{}' has no commands", path.id, layer.id));
                }
            }

            for spec in layer.layout_specs() {
                if !self.resolver.has_region(&spec.region) {
                    result.errors.push(format!(
                        "Layer '{}' references unknown region: {}",
                        layer.id, spec.region
                    ));
                }
                let limit = self.thresholds.large_offset;
                if spec.offset.x.abs() > limit || spec.offset.y.abs() > limit {
                    result.warnings.push(format!(
                        "Layer '{}' has a large offset ({}, {}) in region '{}'",
                        layer.id, spec.offset.x, spec.offset.y, spec.region
                    ));
                }
            }

            let label = layer.label.trim().to_lowercase();
            let generic = label.is_empty()
                || label == layer.id.to_lowercase()
                || GENERIC_NAMES
                    .iter()
                    .any(|g| label == *g || label.trim_start_matches(g).trim().parse::<u32>().is_ok());
            if generic {
                result.suggestions.push(format!(
                    "Give layer '{}' a descriptive label (e.g. \"background sky\", \"main subject\")",
                    layer.id
                ));
            }
        }

        result.valid = result.errors.is_empty();
        result
    }

    /// Drops empty layers and merges layers sharing a region and an identical
    /// style signature into the first of them.
    pub fn optimize_layers(&mut self, layers: &[UnifiedLayer]) -> OptimizationResult {
        let signature = content_signature(&layers).ok();
        if let Some(hit) = signature.as_ref().and_then(|s| self.optimization_cache.get(s)) {
            debug!("optimization cache hit");
            return hit.clone();
        }

        let mut removed = vec![];
        let mut merges: Vec<MergeProposal> = vec![];
        let mut kept: Vec<UnifiedLayer> = vec![];
        // (region, style signature) -> index into `kept`
        let mut targets: HashMap<(String, String), usize> = HashMap::new();

        for layer in layers {
            if layer.paths.is_empty() {
                removed.push(layer.id.clone());
                continue;
            }
            let Some(region) = layer.primary_region() else {
                kept.push(layer.clone());
                continue;
            };
            let key = (region.to_string(), style_signature(layer));
            match targets.get(&key) {
                Some(&idx) => {
                    let target = &mut kept[idx];
                    let taken: HashSet<String> = target.paths.iter().map(|p| p.id.clone()).collect();
                    for path in &layer.paths {
                        let mut path = path.clone();
                        if taken.contains(&path.id) {
                            path.id = format!("{}_{}", layer.id, path.id);
                        }
                        target.paths.push(path);
                    }
                    let target_id = target.id.clone();
                    match merges.iter_mut().find(|m| m.target == target_id) {
                        Some(m) => m.merged.push(layer.id.clone()),
                        None => merges.push(MergeProposal {
                            target: target_id,
                            merged: vec![layer.id.clone()],
                            region: region.to_string(),
                        }),
                    }
                    removed.push(layer.id.clone());
                }
                None => {
                    targets.insert(key, kept.len());
                    kept.push(layer.clone());
                }
            }
        }

        let original = layers.len();
        let result = OptimizationResult {
            optimized_layer_count: kept.len(),
            layers: kept,
            performance_gain: if original == 0 {
                0.0
            } else {
                removed.len() as f64 / original as f64 * 100.0
            },
            removed_layers: removed,
            merges,
            original_layer_count: original,
        };
        if let Some(signature) = signature {
            self.optimization_cache.insert(signature, result.clone());
        }
        result
    }

    /// Parent is the nearest preceding layer sharing the region; dependencies
    /// are all other layers sharing it.
    pub fn create_layer_hierarchy(&self, layers: &[UnifiedLayer]) -> LayerHierarchy {
        let mut nodes: Vec<HierarchyNode> = layers
            .iter()
            .map(|l| HierarchyNode {
                layer_id: l.id.clone(),
                parent: None,
                children: vec![],
                dependencies: vec![],
                depth: 0,
            })
            .collect();

        for (i, layer) in layers.iter().enumerate() {
            let Some(region) = layer.primary_region() else { continue };
            let parent = (0..i).rev().find(|&j| layers[j].primary_region() == Some(region));
            if let Some(j) = parent {
                nodes[i].parent = Some(layers[j].id.clone());
                nodes[i].depth = nodes[j].depth + 1;
                nodes[j].children.push(layer.id.clone());
            }
            nodes[i].dependencies = layers
                .iter()
                .enumerate()
                .filter(|(k, other)| *k != i && other.primary_region() == Some(region))
                .map(|(_, other)| other.id.clone())
                .collect();
        }

        let roots = nodes
            .iter()
            .filter(|n| n.parent.is_none())
            .map(|n| n.layer_id.clone())
            .collect();
        LayerHierarchy { nodes, roots }
    }

    /// Region groups (center first, priority falling with distance from the
    /// canvas center) plus keyword-based semantic groups.
    pub fn group_layers_by_purpose(&self, layers: &[UnifiedLayer]) -> Vec<LayerGroup> {
        let mut by_region: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut by_purpose: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();

        for layer in layers {
            if let Some(region) = layer.primary_region() {
                by_region.entry(region.to_string()).or_default().push(layer.id.clone());
            }
            if let Some(purpose) = layer_purpose(layer) {
                by_purpose.entry(purpose).or_default().push(layer.id.clone());
            }
        }

        let mut groups: Vec<LayerGroup> = by_region
            .into_iter()
            .map(|(region, layer_ids)| LayerGroup {
                priority: self.region_priority(&region),
                name: format!("region:{}", region),
                kind: GroupKind::Region,
                layer_ids,
            })
            .collect();

        groups.extend(by_purpose.into_iter().map(|(purpose, layer_ids)| {
            let priority = PURPOSES
                .iter()
                .find(|(name, _, _)| *name == purpose)
                .map_or(0, |(_, p, _)| *p);
            LayerGroup {
                name: format!("purpose:{}", purpose),
                kind: GroupKind::Semantic,
                layer_ids,
                priority,
            }
        }));

        groups.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        groups
    }

    fn region_priority(&self, region: &str) -> i32 {
        match self.resolver.region_bounds(region) {
            Some(r) => {
                let c = r.center();
                let distance = ((c.x - 0.5).powi(2) + (c.y - 0.5).powi(2)).sqrt();
                100 - (distance * 100.0).round() as i32
            }
            None => 0,
        }
    }

    pub fn layer_statistics(&mut self, layers: &[UnifiedLayer], canvas_width: f64, canvas_height: f64) -> LayerStatistics {
        let mut stats = LayerStatistics {
            layer_count: layers.len(),
            ..LayerStatistics::default()
        };
        let mut regions = std::collections::BTreeSet::new();
        for layer in layers {
            let a = self.analyze_layer(layer, canvas_width, canvas_height);
            stats.path_count += a.path_count;
            stats.command_count += a.command_count;
            *stats.complexity_distribution.entry(a.complexity).or_insert(0) += 1;
            stats.estimated_render_time_ms += a.estimated_render_time_ms;
            stats.estimated_memory_bytes += a.estimated_memory_bytes;
            regions.extend(a.regions);
        }
        if stats.layer_count > 0 {
            stats.average_paths_per_layer = stats.path_count as f64 / stats.layer_count as f64;
        }
        if stats.path_count > 0 {
            stats.average_commands_per_path = stats.command_count as f64 / stats.path_count as f64;
        }
        stats.regions_used = regions.into_iter().collect();
        stats
    }
}

impl Default for LayerAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Style signature: canonical JSON of the layer's distinct path styles.
fn style_signature(layer: &UnifiedLayer) -> String {
    let mut styles: Vec<String> = layer
        .paths
        .iter()
        .filter_map(|p| canonical_json(&p.style).ok())
        .collect();
    styles.sort();
    styles.dedup();
    styles.join("|")
}

fn coordinate_bounds(layer: &UnifiedLayer) -> Option<Rect> {
    let mut acc: Option<(f64, f64, f64, f64)> = None;
    for cmd in layer.paths.iter().flat_map(|p| p.commands.iter()) {
        if cmd.kind() == Some(CommandKind::Close) {
            continue;
        }
        for pair in cmd.coords.chunks_exact(2) {
            let (x, y) = (pair[0], pair[1]);
            acc = Some(match acc {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }
    acc.map(|(x0, y0, x1, y1)| Rect::new(x0, y0, x1 - x0, y1 - y0))
}
