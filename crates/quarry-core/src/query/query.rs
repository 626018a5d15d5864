//! The query orchestrator.
//!
//! A `Query` holds the declarative configuration (filters, order, range,
//! base collection) and drives the filter → order → range pipeline, caching
//! results across invocations. Mutators invalidate exactly the cached
//! artifacts their change affects.

use std::collections::BTreeSet;

use quarry_expr::{Expression, ObjectId, OrderCriterion};
use tracing::debug;

use crate::dataset::Dataset;
use crate::error::Error;
use crate::store::{Database, Object};

use super::filter::{apply_filters, build_plan};
use super::order::apply_order;
use super::resolve::Cost;
use super::QueryCtx;

/// Cached pipeline artifacts.
///
/// The states form a ladder: a window only exists alongside the full sorted
/// sequence it was cut from, so a range change can re-slice without
/// re-sorting, and an order change can fall back to the candidate set
/// without re-filtering. "Sliced but not filtered" is unrepresentable.
#[derive(Debug, Clone, Default)]
enum ResultCache {
    #[default]
    Empty,
    /// Post-filter candidate set.
    Filtered(BTreeSet<ObjectId>),
    /// Candidates in the current order.
    Sorted(Vec<ObjectId>),
    /// The current order plus the current range window cut from it.
    Sliced {
        sorted: Vec<ObjectId>,
        window: Vec<ObjectId>,
    },
}

impl ResultCache {
    fn on_filters_changed(&mut self) {
        *self = ResultCache::Empty;
    }

    /// The candidate set survives an order change; any sequence is stale.
    fn on_order_changed(&mut self) {
        let current = std::mem::take(self);
        *self = match current {
            ResultCache::Sorted(ids) => ResultCache::Filtered(ids.into_iter().collect()),
            ResultCache::Sliced { sorted, .. } => {
                ResultCache::Filtered(sorted.into_iter().collect())
            }
            other => other,
        };
    }

    /// Only the window is derived from the range; the sorted sequence (and
    /// everything below it) stays valid.
    fn on_range_changed(&mut self) {
        let current = std::mem::take(self);
        *self = match current {
            ResultCache::Sliced { sorted, .. } => ResultCache::Sorted(sorted),
            other => other,
        };
    }
}

/// One plan entry as reported by [`Query::explain`].
#[derive(Debug, Clone)]
pub struct PlanEntry {
    /// The step's cost.
    pub cost: Cost,
    /// Display form of the filter.
    pub filter: String,
    /// Whether an index strategy serves this step.
    pub indexed: bool,
}

/// A query over a set of persisted objects.
pub struct Query<'a> {
    db: &'a Database,
    type_name: String,
    filters: Vec<Expression>,
    order: Vec<OrderCriterion>,
    range: Option<(usize, usize)>,
    base: Option<Vec<ObjectId>>,
    cached: bool,
    cache: ResultCache,
    cached_len: Option<usize>,
}

impl<'a> Query<'a> {
    /// Create a query over a registered type. Caching is on by default.
    pub fn new(db: &'a Database, type_name: &str) -> Result<Self, Error> {
        db.catalog().type_def(type_name)?;
        Ok(Self {
            db,
            type_name: type_name.to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            range: None,
            base: None,
            cached: true,
            cache: ResultCache::Empty,
            cached_len: None,
        })
    }

    /// The queried type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The current filter list (implicitly AND-ed).
    pub fn filters(&self) -> &[Expression] {
        &self.filters
    }

    /// The current order criteria.
    pub fn order(&self) -> &[OrderCriterion] {
        &self.order
    }

    /// The current range window.
    pub fn range(&self) -> Option<(usize, usize)> {
        self.range
    }

    /// Whether results are memoized across invocations.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Replace the filter list.
    pub fn set_filters(&mut self, filters: Vec<Expression>) {
        self.filters = filters;
        self.cache.on_filters_changed();
        self.cached_len = None;
    }

    /// Add one filter.
    pub fn add_filter(&mut self, filter: Expression) {
        self.filters.push(filter);
        self.cache.on_filters_changed();
        self.cached_len = None;
    }

    /// Add several filters.
    pub fn extend_filters(&mut self, filters: impl IntoIterator<Item = Expression>) {
        self.filters.extend(filters);
        self.cache.on_filters_changed();
        self.cached_len = None;
    }

    /// Replace the order criteria.
    ///
    /// Criteria naming unknown members are rejected here, before any
    /// execution. Setting an equal order is a no-op and keeps the cache.
    pub fn set_order(&mut self, order: Vec<OrderCriterion>) -> Result<(), Error> {
        self.validate_order(&order)?;
        if order != self.order {
            self.order = order;
            self.cache.on_order_changed();
        }
        Ok(())
    }

    /// Replace the order criteria from `"name"` / `"+name"` / `"-name"`
    /// specs.
    pub fn set_order_by(&mut self, specs: &[&str]) -> Result<(), Error> {
        let mut order = Vec::with_capacity(specs.len());
        for spec in specs {
            order.push(OrderCriterion::parse(spec)?);
        }
        self.set_order(order)
    }

    /// Append one order criterion.
    pub fn add_order(&mut self, criterion: OrderCriterion) -> Result<(), Error> {
        self.validate_order(std::slice::from_ref(&criterion))?;
        self.order.push(criterion);
        self.cache.on_order_changed();
        Ok(())
    }

    fn validate_order(&self, order: &[OrderCriterion]) -> Result<(), Error> {
        for criterion in order {
            self.db.catalog().member_of(&self.type_name, &criterion.field)?;
        }
        Ok(())
    }

    /// Set or clear the `[start, end)` window over the ordered results.
    ///
    /// Adding a range for the first time invalidates nothing; changing an
    /// existing one drops only the cached window.
    pub fn set_range(&mut self, range: Option<(usize, usize)>) {
        if range == self.range {
            return;
        }
        let had_range = self.range.is_some();
        self.range = range;
        if had_range {
            self.cache.on_range_changed();
        }
        self.cached_len = None;
    }

    /// Restrict the query to an explicit, intrinsically ordered candidate
    /// collection instead of every object of the type.
    ///
    /// Clearing the base collection on an unindexed type is rejected: such a
    /// type has no id universe to fall back to.
    pub fn set_base_collection(&mut self, base: Option<Vec<ObjectId>>) -> Result<(), Error> {
        if base.is_none() && !self.db.catalog().type_def(&self.type_name)?.indexed {
            return Err(Error::NotIndexed(self.type_name.clone()));
        }
        self.base = base;
        self.cache.on_filters_changed();
        self.cached_len = None;
        Ok(())
    }

    /// Toggle result memoization. Turning it off drops cached artifacts.
    pub fn set_cached(&mut self, cached: bool) {
        self.cached = cached;
        if !cached {
            self.discard_results();
        }
    }

    /// Drop every cached artifact.
    pub fn discard_results(&mut self) {
        self.cache = ResultCache::Empty;
        self.cached_len = None;
    }

    /// Execute the full pipeline: filter, order, slice.
    pub fn execute(&mut self) -> Result<Dataset, Error> {
        self.execute_opts(true, true)
    }

    /// Execute with explicit phase control.
    ///
    /// `sorted = false` stops after filtering (the result is a set);
    /// `sliced = false` skips the range window. Cached artifacts are reused
    /// from whatever stage is still valid and upgraded with what this call
    /// computes.
    pub fn execute_opts(&mut self, sorted: bool, sliced: bool) -> Result<Dataset, Error> {
        let have_range = self.range.is_some();

        // Re-enter directly at the highest cached stage this call can use
        if self.cached {
            match &self.cache {
                ResultCache::Sliced { window, .. } if sorted && sliced => {
                    debug!(type_name = %self.type_name, "cached window");
                    return Ok(Dataset::Sequence(window.clone()));
                }
                ResultCache::Sliced { sorted: ids, .. } if sorted => {
                    return Ok(Dataset::Sequence(ids.clone()));
                }
                ResultCache::Sorted(ids) if sorted => {
                    let sequence = ids.clone();
                    if sliced {
                        if let Some(range) = self.range {
                            let window = slice_window(&sequence, range);
                            debug!(type_name = %self.type_name, "slicing cached order");
                            self.cache = ResultCache::Sliced {
                                sorted: sequence,
                                window: window.clone(),
                            };
                            return Ok(Dataset::Sequence(window));
                        }
                    }
                    return Ok(Dataset::Sequence(sequence));
                }
                _ => {}
            }
        }

        // Filter phase (or cached candidates)
        let set: BTreeSet<ObjectId> = if self.cached {
            match &self.cache {
                ResultCache::Filtered(set) => {
                    debug!(type_name = %self.type_name, "cached candidates");
                    set.clone()
                }
                ResultCache::Sorted(ids) | ResultCache::Sliced { sorted: ids, .. } => {
                    ids.iter().copied().collect()
                }
                ResultCache::Empty => self.compute_filtered()?,
            }
        } else {
            self.compute_filtered()?
        };

        if !sorted {
            if self.cached && matches!(self.cache, ResultCache::Empty) {
                self.cache = ResultCache::Filtered(set.clone());
            }
            return Ok(Dataset::Set(set));
        }

        // Order phase
        let ordered = {
            let ctx = QueryCtx {
                db: self.db,
                type_name: &self.type_name,
            };
            apply_order(&ctx, set, &self.order, self.base.as_deref(), have_range)?
        };

        // Range phase
        match ordered {
            Dataset::Set(set) => {
                // No criteria, no range: ordering was skippable work
                if self.cached {
                    self.cache = ResultCache::Filtered(set.clone());
                }
                Ok(Dataset::Set(set))
            }
            Dataset::Sequence(sequence) => {
                if sliced {
                    if let Some(range) = self.range {
                        let window = slice_window(&sequence, range);
                        if self.cached {
                            self.cache = ResultCache::Sliced {
                                sorted: sequence,
                                window: window.clone(),
                            };
                        }
                        return Ok(Dataset::Sequence(window));
                    }
                }
                if self.cached {
                    self.cache = ResultCache::Sorted(sequence.clone());
                }
                Ok(Dataset::Sequence(sequence))
            }
        }
    }

    fn compute_filtered(&self) -> Result<BTreeSet<ObjectId>, Error> {
        let ctx = QueryCtx {
            db: self.db,
            type_name: &self.type_name,
        };
        let universe: BTreeSet<ObjectId> = match &self.base {
            Some(ids) => ids.iter().copied().collect(),
            None => self.db.all_ids(&self.type_name)?,
        };
        if self.filters.is_empty() {
            return Ok(universe);
        }
        let plan = build_plan(&ctx, &self.filters)?;
        debug!(
            type_name = %self.type_name,
            steps = plan.len(),
            initial = universe.len(),
            "executing filter plan"
        );
        apply_filters(&ctx, &plan, universe)
    }

    /// The execution plan for the current filters, cost-ordered.
    pub fn explain(&self) -> Result<Vec<PlanEntry>, Error> {
        let ctx = QueryCtx {
            db: self.db,
            type_name: &self.type_name,
        };
        let plan = build_plan(&ctx, &self.filters)?;
        Ok(plan
            .iter()
            .map(|step| PlanEntry {
                cost: step.cost,
                filter: step.filter.to_string(),
                indexed: step.strategy.is_some(),
            })
            .collect())
    }

    /// Number of matches, without sorting work. Respects the range window
    /// arithmetically. Cached independently of the result artifacts.
    pub fn len(&mut self) -> Result<usize, Error> {
        if self.cached {
            if let Some(cached) = self.cached_len {
                return Ok(cached);
            }
        }

        let cached_count = if self.cached {
            match &self.cache {
                ResultCache::Filtered(set) => Some(set.len()),
                ResultCache::Sorted(ids) | ResultCache::Sliced { sorted: ids, .. } => {
                    Some(ids.len())
                }
                ResultCache::Empty => None,
            }
        } else {
            None
        };
        let filtered = match cached_count {
            Some(count) => count,
            None => self.execute_opts(false, false)?.len(),
        };

        let count = match self.range {
            Some((start, end)) => {
                let end = end.min(filtered);
                end.saturating_sub(start)
            }
            None => filtered,
        };

        if self.cached {
            self.cached_len = Some(count);
        }
        Ok(count)
    }

    /// Whether any object matches the filters (range ignored).
    pub fn is_empty(&mut self) -> Result<bool, Error> {
        Ok(self.execute_opts(false, false)?.is_empty())
    }

    /// Whether the given object is among the query's results.
    pub fn contains(&mut self, id: ObjectId) -> Result<bool, Error> {
        Ok(self.execute()?.contains(id))
    }

    /// The object at a position of the final sequence.
    pub fn get(&mut self, position: usize) -> Result<Option<Object>, Error> {
        let ids = self.execute()?.into_sequence();
        Ok(ids.get(position).and_then(|id| self.db.get(*id)))
    }

    /// Iterate the matched objects. Ids that vanish from the store between
    /// execution and iteration are skipped.
    pub fn iter(&mut self) -> Result<Objects<'a>, Error> {
        let ids = self.execute()?.into_sequence();
        Ok(Objects {
            db: self.db,
            ids: ids.into_iter(),
        })
    }

    /// Delete every object matched by the query.
    ///
    /// The ids are materialized before the first deletion, so removing one
    /// match can neither skip nor duplicate another. Ids already gone are
    /// skipped. Returns the number of objects deleted.
    pub fn delete_matching(&mut self) -> Result<usize, Error> {
        let snapshot = self.execute_opts(false, false)?.into_sequence();
        debug!(type_name = %self.type_name, matches = snapshot.len(), "bulk delete");
        let mut deleted = 0;
        for id in snapshot {
            if self.db.delete(id) {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Derive a narrowed child query.
    pub fn select(&self) -> Select<'_, 'a> {
        Select {
            parent: self,
            filters: None,
            order: None,
            range: None,
        }
    }
}

/// Builder for a child query derived from a parent via [`Query::select`].
///
/// Anything not overridden is inherited. Cache carry-over mirrors the
/// mutator rules: extending the filters drops everything, a new order keeps
/// the parent's candidate set, a new range keeps its sorted sequence.
pub struct Select<'q, 'a> {
    parent: &'q Query<'a>,
    filters: Option<Vec<Expression>>,
    order: Option<Vec<OrderCriterion>>,
    range: Option<Option<(usize, usize)>>,
}

impl<'q, 'a> Select<'q, 'a> {
    /// Extend the parent's filters.
    pub fn filtered(mut self, filters: Vec<Expression>) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Override the order criteria.
    pub fn ordered(mut self, order: Vec<OrderCriterion>) -> Self {
        self.order = Some(order);
        self
    }

    /// Override the range window.
    pub fn range(mut self, start: usize, end: usize) -> Self {
        self.range = Some(Some((start, end)));
        self
    }

    /// Drop the parent's range.
    pub fn unranged(mut self) -> Self {
        self.range = Some(None);
        self
    }

    /// Build the child query.
    pub fn finish(self) -> Result<Query<'a>, Error> {
        let parent = self.parent;

        let narrowed = self.filters.is_some();
        let mut filters = parent.filters.clone();
        if let Some(extra) = self.filters {
            filters.extend(extra);
        }

        let mut child = Query {
            db: parent.db,
            type_name: parent.type_name.clone(),
            filters,
            order: parent.order.clone(),
            range: parent.range,
            base: parent.base.clone(),
            cached: parent.cached,
            cache: ResultCache::Empty,
            cached_len: None,
        };

        if let Some(order) = self.order {
            child.validate_order(&order)?;
            child.order = order;
        }
        if let Some(range) = self.range {
            child.range = range;
        }

        if !narrowed && parent.cached {
            let mut cache = parent.cache.clone();
            if child.order != parent.order {
                cache.on_order_changed();
            }
            let range_changed = child.range != parent.range;
            if range_changed {
                cache.on_range_changed();
            }
            child.cache = cache;
            if !range_changed {
                child.cached_len = parent.cached_len;
            }
        }

        Ok(child)
    }
}

/// Iterator over matched objects, dereferencing ids through the store.
pub struct Objects<'a> {
    db: &'a Database,
    ids: std::vec::IntoIter<ObjectId>,
}

impl Iterator for Objects<'_> {
    type Item = Object;

    fn next(&mut self) -> Option<Object> {
        for id in self.ids.by_ref() {
            if let Some(object) = self.db.get(id) {
                return Some(object);
            }
        }
        None
    }
}

fn slice_window(sequence: &[ObjectId], (start, end): (usize, usize)) -> Vec<ObjectId> {
    if start >= end || start >= sequence.len() {
        return Vec::new();
    }
    sequence[start..end.min(sequence.len())].to_vec()
}
