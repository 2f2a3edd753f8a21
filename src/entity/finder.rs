/*!

The predicate-evaluation engine behind [`FindEntities`](crate::entity::FindEntities).
Stateless: it walks a snapshot of refs and applies an [`Aspect`] and an ordered
[`Filter`] chain to each candidate.

By convention the aspect is the cheaper, more selective predicate, so it is evaluated
first and a rejection skips the filters entirely. Filters run in list order and
short-circuit at the first rejection (logical AND). A failing filter aborts the whole
call — an exception is never treated as a rejection, and there are no partial results.

*/

use std::sync::Arc;

use crate::context::Context;
use crate::entity::EntityRef;
use crate::error::HolonError;

/// A predicate over an entity's component composition.
///
/// Closures of the shape `Fn(&EntityRef) -> bool` implement this.
pub trait Aspect: Send + Sync {
    fn matches(&self, entity: &EntityRef) -> bool;
}

impl<F> Aspect for F
where
    F: Fn(&EntityRef) -> bool + Send + Sync,
{
    fn matches(&self, entity: &EntityRef) -> bool {
        self(entity)
    }
}

/// The default aspect: accepts every entity.
#[derive(Debug, Default, Copy, Clone)]
pub struct MatchAll;

impl Aspect for MatchAll {
    fn matches(&self, _entity: &EntityRef) -> bool {
        true
    }
}

/// An ordered, short-circuiting predicate over a single candidate ref, with access to
/// the owning context.
///
/// Closures of the shape `Fn(&Context, &EntityRef) -> Result<bool, HolonError>`
/// implement this.
pub trait Filter: Send + Sync {
    /// Diagnostic name carried in `FilterFailed` errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn accept(&self, context: &Context, entity: &EntityRef) -> Result<bool, HolonError>;
}

impl<F> Filter for F
where
    F: Fn(&Context, &EntityRef) -> Result<bool, HolonError> + Send + Sync,
{
    fn accept(&self, context: &Context, entity: &EntityRef) -> Result<bool, HolonError> {
        self(context, entity)
    }
}

/// Walks `refs` in input order and returns the candidates accepted by `aspect` and
/// every filter in `filters`.
pub fn filter_entities(
    context: &Context,
    refs: impl IntoIterator<Item = EntityRef>,
    aspect: &dyn Aspect,
    filters: &[Arc<dyn Filter>],
) -> Result<Vec<EntityRef>, HolonError> {
    let mut matches = Vec::new();

    'candidates: for entity in refs {
        if !aspect.matches(&entity) {
            continue;
        }
        for filter in filters {
            let accepted =
                filter
                    .accept(context, &entity)
                    .map_err(|source| HolonError::FilterFailed {
                        filter: filter.name().to_string(),
                        entity: entity.id(),
                        source: Box::new(source),
                    })?;
            if !accepted {
                continue 'candidates;
            }
        }
        matches.push(entity);
    }

    Ok(matches)
}
