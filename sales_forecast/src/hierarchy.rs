//! Hierarchy construction: aggregate series, summing matrix and level tags
//!
//! Series are identified by their path through the hierarchy joined with
//! `/`, e.g. `Total`, `Total/25` and `Total/25/2808`. Rows of the summing
//! matrix follow level order (top first) and, within a level, ascending
//! (shop_id, item_id) order of the leaves below them.

use crate::data::{CompletedSeries, LeafKey};
use crate::error::{ForecastError, Result};
use chrono::{Days, NaiveDate};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Name of the single root node
pub const TOTAL_NAME: &str = "Total";

/// Tolerance used when checking that aggregates equal the sum of children
const SUM_TOLERANCE: f64 = 1e-9;

/// One level of the sales hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Total,
    Store,
    Item,
}

impl Level {
    /// Column name of this level in the prepared data
    pub fn column(&self) -> &'static str {
        match self {
            Level::Total => "total",
            Level::Store => "shop_id",
            Level::Item => "item_id",
        }
    }

    fn component(&self, key: &LeafKey) -> String {
        match self {
            Level::Total => TOTAL_NAME.to_string(),
            Level::Store => key.shop_id.to_string(),
            Level::Item => key.item_id.to_string(),
        }
    }
}

/// Ordered list of grouping levels, top first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchySpec {
    levels: Vec<Level>,
}

impl Default for HierarchySpec {
    fn default() -> Self {
        Self {
            levels: vec![Level::Total, Level::Store, Level::Item],
        }
    }
}

impl HierarchySpec {
    /// Create a spec; levels must be strictly ordered and end with Store → Item
    pub fn new(levels: Vec<Level>) -> Result<Self> {
        if levels.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ForecastError::HierarchyError(format!(
                "Levels must be strictly ordered top to bottom: {:?}",
                levels
            )));
        }
        if !levels.ends_with(&[Level::Store, Level::Item]) {
            return Err(ForecastError::HierarchyError(
                "Hierarchy must end with the store and item levels".to_string(),
            ));
        }
        Ok(Self { levels })
    }

    /// Parse column names such as `["total", "shop_id", "item_id"]`
    pub fn from_columns<S: AsRef<str>>(columns: &[S]) -> Result<Self> {
        let levels = columns
            .iter()
            .map(|c| match c.as_ref() {
                "total" => Ok(Level::Total),
                "shop_id" => Ok(Level::Store),
                "item_id" => Ok(Level::Item),
                other => Err(ForecastError::HierarchyError(format!(
                    "Unknown hierarchy column: {}",
                    other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(levels)
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Cumulative level names, e.g. `total`, `total/shop_id`, `total/shop_id/item_id`
    pub fn level_names(&self) -> Vec<String> {
        (1..=self.levels.len())
            .map(|depth| {
                self.levels[..depth]
                    .iter()
                    .map(Level::column)
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .collect()
    }

    /// Series id of the ancestor of `key` at `depth` (0 = top level)
    pub fn series_id(&self, key: &LeafKey, depth: usize) -> String {
        self.levels[..=depth]
            .iter()
            .map(|l| l.component(key))
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Series belonging to one hierarchy level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTag {
    pub name: String,
    pub series_ids: Vec<String>,
}

/// Level name → series ids, in level order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagMap {
    levels: Vec<LevelTag>,
}

impl TagMap {
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.levels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.series_ids.as_slice())
    }

    pub fn levels(&self) -> &[LevelTag] {
        &self.levels
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().map(|l| l.name.as_str())
    }

    /// Bottom level tag
    pub fn leaf_level(&self) -> Option<&LevelTag> {
        self.levels.last()
    }

    /// Total number of series across all levels
    pub fn series_count(&self) -> usize {
        self.levels.iter().map(|l| l.series_ids.len()).sum()
    }
}

/// 0/1 matrix mapping leaf series (columns) onto every series (rows)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummingMatrix {
    row_ids: Vec<String>,
    leaf_ids: Vec<String>,
    data: Array2<f64>,
}

impl SummingMatrix {
    pub fn row_ids(&self) -> &[String] {
        &self.row_ids
    }

    pub fn leaf_ids(&self) -> &[String] {
        &self.leaf_ids
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// (series, leaves)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// `S · B` for a leaves × steps matrix `B`
    pub fn aggregate(&self, leaves: ArrayView2<f64>) -> Result<Array2<f64>> {
        if leaves.nrows() != self.leaf_ids.len() {
            return Err(ForecastError::HierarchyError(format!(
                "Expected {} leaf rows, got {}",
                self.leaf_ids.len(),
                leaves.nrows()
            )));
        }
        Ok(self.data.dot(&leaves))
    }
}

/// One series of the hierarchy with its full history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchySeries {
    pub id: String,
    /// Index into [`HierarchySpec::levels`]
    pub depth: usize,
    /// Index of the parent series, `None` at the top level
    pub parent: Option<usize>,
    pub values: Vec<f64>,
}

/// Every series at every level plus the structures relating them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchicalData {
    spec: HierarchySpec,
    start: NaiveDate,
    series: Vec<HierarchySeries>,
    leaf_keys: Vec<LeafKey>,
    matrix: SummingMatrix,
    tags: TagMap,
}

impl HierarchicalData {
    pub fn spec(&self) -> &HierarchySpec {
        &self.spec
    }

    pub fn series(&self) -> &[HierarchySeries] {
        &self.series
    }

    pub fn matrix(&self) -> &SummingMatrix {
        &self.matrix
    }

    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    /// Leaf keys in matrix column order
    pub fn leaf_keys(&self) -> &[LeafKey] {
        &self.leaf_keys
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Number of observed days
    pub fn history_len(&self) -> usize {
        self.series.first().map(|s| s.values.len()).unwrap_or(0)
    }

    pub fn last_date(&self) -> NaiveDate {
        let offset = self.history_len().saturating_sub(1) as u64;
        self.start
            .checked_add_days(Days::new(offset))
            .unwrap_or(self.start)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.series.iter().position(|s| s.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&HierarchySeries> {
        self.index_of(id).map(|i| &self.series[i])
    }

    /// Indices of the direct children of series `index`
    pub fn children_of(&self, index: usize) -> Vec<usize> {
        self.series
            .iter()
            .enumerate()
            .filter(|(_, s)| s.parent == Some(index))
            .map(|(i, _)| i)
            .collect()
    }

    /// Index of the first leaf row; leaves occupy the final rows
    pub fn first_leaf_row(&self) -> usize {
        self.series.len() - self.leaf_keys.len()
    }

    /// Check every structural invariant of the hierarchy
    pub fn validate(&self) -> Result<()> {
        let (rows, cols) = self.matrix.shape();
        let n_series = self.series.len();
        let n_leaves = self.leaf_keys.len();

        if n_leaves == 0 || rows != n_series || cols != n_leaves {
            return Err(ForecastError::HierarchyError(format!(
                "Matrix is {}x{} for {} series and {} leaves",
                rows, cols, n_series, n_leaves
            )));
        }

        let ids: Vec<&str> = self.series.iter().map(|s| s.id.as_str()).collect();
        if self.matrix.row_ids.iter().map(String::as_str).ne(ids.iter().copied()) {
            return Err(ForecastError::HierarchyError(
                "Matrix rows don't match series ids".to_string(),
            ));
        }
        let tagged = self
            .tags
            .levels()
            .iter()
            .flat_map(|l| l.series_ids.iter().map(String::as_str));
        if tagged.ne(ids.iter().copied()) {
            return Err(ForecastError::HierarchyError(
                "Tag map doesn't cover the series in level order".to_string(),
            ));
        }
        if self.tags.levels().len() != self.spec.levels().len() {
            return Err(ForecastError::HierarchyError(
                "Tag map and hierarchy spec have different depths".to_string(),
            ));
        }

        let data = &self.matrix.data;
        if data.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(ForecastError::HierarchyError(
                "Summing matrix must only hold 0 and 1".to_string(),
            ));
        }

        // Leaf block is the identity
        let first_leaf = self.first_leaf_row();
        for j in 0..n_leaves {
            let row = data.row(first_leaf + j);
            if row.sum() != 1.0 || row[j] != 1.0 {
                return Err(ForecastError::HierarchyError(format!(
                    "Leaf row {} is not an identity row",
                    self.series[first_leaf + j].id
                )));
            }
        }

        // Within each level every leaf is covered exactly once
        let mut offset = 0;
        for level in self.tags.levels() {
            let block = data.slice(ndarray::s![offset..offset + level.series_ids.len(), ..]);
            for (j, column) in block.columns().into_iter().enumerate() {
                if column.sum() != 1.0 {
                    return Err(ForecastError::HierarchyError(format!(
                        "Leaf {} appears {} times in level {}",
                        self.matrix.leaf_ids[j],
                        column.sum(),
                        level.name
                    )));
                }
            }
            offset += level.series_ids.len();
        }

        // Aggregates equal the sum of their children
        for (index, parent) in self.series.iter().enumerate() {
            if index >= first_leaf {
                break;
            }
            let children = self.children_of(index);
            if children.is_empty() {
                return Err(ForecastError::HierarchyError(format!(
                    "Aggregate series {} has no children",
                    parent.id
                )));
            }

            let mut row_sum = ndarray::Array1::<f64>::zeros(n_leaves);
            let mut value_sum = vec![0.0; parent.values.len()];
            for &c in &children {
                if self.series[c].depth != parent.depth + 1 {
                    return Err(ForecastError::HierarchyError(format!(
                        "Child {} of {} skips a level",
                        self.series[c].id, parent.id
                    )));
                }
                row_sum += &data.row(c);
                for (acc, v) in value_sum.iter_mut().zip(self.series[c].values.iter()) {
                    *acc += v;
                }
            }

            if row_sum != data.row(index) {
                return Err(ForecastError::HierarchyError(format!(
                    "Matrix row of {} is not the sum of its children's rows",
                    parent.id
                )));
            }
            let incoherent = parent
                .values
                .iter()
                .zip(value_sum.iter())
                .any(|(p, s)| (p - s).abs() > SUM_TOLERANCE * (1.0 + p.abs()));
            if incoherent {
                return Err(ForecastError::HierarchyError(format!(
                    "Series {} is not the sum of its children",
                    parent.id
                )));
            }
        }

        Ok(())
    }
}

/// Builds the full hierarchy from completed leaf series
#[derive(Debug, Clone, Default)]
pub struct HierarchyBuilder {
    spec: HierarchySpec,
}

impl HierarchyBuilder {
    pub fn new(spec: HierarchySpec) -> Self {
        Self { spec }
    }

    pub fn build(&self, completed: &CompletedSeries) -> Result<HierarchicalData> {
        let leaves = completed.leaves();
        if leaves.is_empty() {
            return Err(ForecastError::NoQualifyingSeries(
                "cannot build a hierarchy without leaves".to_string(),
            ));
        }

        let depth_count = self.spec.levels().len();
        let leaf_depth = depth_count - 1;
        let days = completed.days();
        let leaf_ids: Vec<String> = leaves
            .iter()
            .map(|l| self.spec.series_id(&l.key, leaf_depth))
            .collect();

        // Nodes in level order; leaves are sorted so each node's leaves are contiguous
        let mut series: Vec<HierarchySeries> = Vec::new();
        let mut members: Vec<Vec<usize>> = Vec::new();
        let mut tags = TagMap::default();
        let mut index_by_id: HashMap<String, usize> = HashMap::new();
        let level_names = self.spec.level_names();

        for depth in 0..depth_count {
            let mut level_ids = Vec::new();
            for (j, leaf) in leaves.iter().enumerate() {
                let id = self.spec.series_id(&leaf.key, depth);
                let index = match index_by_id.get(&id) {
                    Some(&i) => i,
                    None => {
                        let parent = if depth == 0 {
                            None
                        } else {
                            index_by_id.get(&self.spec.series_id(&leaf.key, depth - 1)).copied()
                        };
                        series.push(HierarchySeries {
                            id: id.clone(),
                            depth,
                            parent,
                            values: vec![0.0; days],
                        });
                        members.push(Vec::new());
                        index_by_id.insert(id.clone(), series.len() - 1);
                        level_ids.push(id);
                        series.len() - 1
                    }
                };

                members[index].push(j);
                for (acc, v) in series[index].values.iter_mut().zip(leaf.values.iter()) {
                    *acc += v;
                }
            }
            tags.levels.push(LevelTag {
                name: level_names[depth].clone(),
                series_ids: level_ids,
            });
        }

        let mut data = Array2::<f64>::zeros((series.len(), leaves.len()));
        for (row, leaf_columns) in members.iter().enumerate() {
            for &j in leaf_columns {
                data[[row, j]] = 1.0;
            }
        }

        let matrix = SummingMatrix {
            row_ids: series.iter().map(|s| s.id.clone()).collect(),
            leaf_ids,
            data,
        };

        let hierarchy = HierarchicalData {
            spec: self.spec.clone(),
            start: completed.start(),
            series,
            leaf_keys: leaves.iter().map(|l| l.key).collect(),
            matrix,
            tags,
        };
        hierarchy.validate()?;

        info!(
            series = hierarchy.series().len(),
            leaves = hierarchy.leaf_keys().len(),
            levels = ?hierarchy.tags().names().collect::<Vec<_>>(),
            "built hierarchy"
        );

        Ok(hierarchy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LeafSeries;
    use pretty_assertions::assert_eq;

    fn completed() -> CompletedSeries {
        let start: NaiveDate = "2023-01-01".parse().unwrap();
        let end: NaiveDate = "2023-01-03".parse().unwrap();
        CompletedSeries::new(
            start,
            end,
            vec![
                LeafSeries {
                    key: LeafKey::new(2, 7),
                    values: vec![1.0, 1.0, 1.0],
                },
                LeafSeries {
                    key: LeafKey::new(1, 5),
                    values: vec![1.0, 2.0, 3.0],
                },
                LeafSeries {
                    key: LeafKey::new(1, 6),
                    values: vec![0.0, 0.0, 4.0],
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_level_names() {
        assert_eq!(
            HierarchySpec::default().level_names(),
            vec!["total", "total/shop_id", "total/shop_id/item_id"]
        );
    }

    #[test]
    fn test_spec_validation() {
        assert!(HierarchySpec::from_columns(&["shop_id", "item_id"]).is_ok());
        assert!(HierarchySpec::from_columns(&["total", "item_id"]).is_err());
        assert!(HierarchySpec::from_columns(&["total", "item_id", "shop_id"]).is_err());
        assert!(HierarchySpec::from_columns(&["total", "region", "item_id"]).is_err());
    }

    #[test]
    fn test_build_structure() {
        let hierarchy = HierarchyBuilder::default().build(&completed()).unwrap();

        let ids: Vec<&str> = hierarchy.series().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["Total", "Total/1", "Total/2", "Total/1/5", "Total/1/6", "Total/2/7"]
        );
        assert_eq!(hierarchy.get("Total").unwrap().values, vec![2.0, 3.0, 8.0]);
        assert_eq!(hierarchy.get("Total/1").unwrap().values, vec![1.0, 2.0, 7.0]);

        let expected = ndarray::array![
            [1.0, 1.0, 1.0],
            [1.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        assert_eq!(hierarchy.matrix().view(), expected.view());
        assert_eq!(
            hierarchy.tags().get("total/shop_id").unwrap(),
            &["Total/1".to_string(), "Total/2".to_string()]
        );
        assert_eq!(hierarchy.children_of(1), vec![3, 4]);
    }

    #[test]
    fn test_store_rooted_hierarchy() {
        let spec = HierarchySpec::from_columns(&["shop_id", "item_id"]).unwrap();
        let hierarchy = HierarchyBuilder::new(spec).build(&completed()).unwrap();
        assert_eq!(hierarchy.tags().levels().len(), 2);
        assert_eq!(hierarchy.series()[0].id, "1");
        assert_eq!(hierarchy.series().len(), 5);
    }

    #[test]
    fn test_validate_detects_tampering() {
        let mut hierarchy = HierarchyBuilder::default().build(&completed()).unwrap();
        hierarchy.series[0].values[0] += 1.0;
        assert!(matches!(
            hierarchy.validate(),
            Err(ForecastError::HierarchyError(_))
        ));

        let mut hierarchy = HierarchyBuilder::default().build(&completed()).unwrap();
        hierarchy.matrix.data[[1, 2]] = 1.0;
        assert!(hierarchy.validate().is_err());
    }
}
