//! Partitioning of export batches by resource and instrumentation scope.

use opentelemetry::InstrumentationScope;
use opentelemetry_sdk::Resource;

/// Records sharing one resource.
#[derive(Debug)]
pub struct ResourceGroup<'a, T> {
    /// The resource every record in this group was produced by.
    pub resource: &'a Resource,
    /// Scope buckets, in order of first appearance.
    pub scopes: Vec<ScopeBucket<'a, T>>,
}

/// Records sharing one instrumentation scope within a [`ResourceGroup`].
#[derive(Debug)]
pub struct ScopeBucket<'a, T> {
    /// `None` for records produced without scope metadata.
    pub scope: Option<&'a InstrumentationScope>,
    /// Records in input order.
    pub records: Vec<T>,
}

impl<'a, T> ResourceGroup<'a, T> {
    /// Iterate over all records of the group, bucket by bucket.
    pub fn records(&self) -> impl Iterator<Item = (Option<&'a InstrumentationScope>, &T)> {
        self.scopes
            .iter()
            .flat_map(|bucket| bucket.records.iter().map(move |r| (bucket.scope, r)))
    }
}

/// Whether a scope carries any identifying metadata.
pub(crate) fn scope_is_set(scope: &InstrumentationScope) -> bool {
    !scope.name().is_empty() || scope.version().is_some()
}

/// Group records by resource value, then by scope.
///
/// Groups appear in the order their resource was first seen, and scope buckets
/// in the order their scope was first seen within the group.
pub fn group_by_resource_and_scope<'a, T, I>(records: I) -> Vec<ResourceGroup<'a, T>>
where
    I: IntoIterator<Item = (&'a Resource, Option<&'a InstrumentationScope>, T)>,
{
    let mut groups: Vec<ResourceGroup<'a, T>> = Vec::new();

    for (resource, scope, record) in records {
        let group_idx = match groups
            .iter()
            .position(|g| std::ptr::eq(g.resource, resource) || g.resource == resource)
        {
            Some(idx) => idx,
            None => {
                groups.push(ResourceGroup {
                    resource,
                    scopes: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[group_idx];

        match group.scopes.iter_mut().find(|b| b.scope == scope) {
            Some(bucket) => bucket.records.push(record),
            None => group.scopes.push(ScopeBucket {
                scope,
                records: vec![record],
            }),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::KeyValue;

    fn resource(service: &'static str) -> Resource {
        Resource::builder_empty()
            .with_attributes([KeyValue::new("service.name", service)])
            .build()
    }

    #[test]
    fn one_group_per_distinct_resource() {
        let a = resource("a");
        let b = resource("b");
        let a_again = resource("a");
        let records = vec![
            (&a, None, 1),
            (&b, None, 2),
            (&a_again, None, 3),
            (&b, None, 4),
            (&a, None, 5),
        ];

        let groups = group_by_resource_and_scope(records);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].resource, &a);
        assert_eq!(groups[1].resource, &b);
        let first: Vec<i32> = groups[0].records().map(|(_, r)| *r).collect();
        let second: Vec<i32> = groups[1].records().map(|(_, r)| *r).collect();
        assert_eq!(first, vec![1, 3, 5]);
        assert_eq!(second, vec![2, 4]);
    }

    #[test]
    fn first_seen_resource_comes_first() {
        let a = resource("a");
        let b = resource("b");
        let c = resource("c");
        let groups = group_by_resource_and_scope(vec![
            (&c, None, ()),
            (&a, None, ()),
            (&b, None, ()),
            (&a, None, ()),
        ]);
        let order: Vec<&Resource> = groups.iter().map(|g| g.resource).collect();
        assert_eq!(order, vec![&c, &a, &b]);
    }

    #[test]
    fn scope_buckets_split_only_on_differing_scope() {
        let res = resource("a");
        let lib_a = InstrumentationScope::builder("lib-a").build();
        let lib_a_again = InstrumentationScope::builder("lib-a").build();
        let lib_b = InstrumentationScope::builder("lib-b")
            .with_version("1.0.0")
            .build();

        let groups = group_by_resource_and_scope(vec![
            (&res, Some(&lib_a), "a1"),
            (&res, None, "none1"),
            (&res, Some(&lib_b), "b1"),
            (&res, Some(&lib_a_again), "a2"),
            (&res, None, "none2"),
        ]);

        assert_eq!(groups.len(), 1);
        let buckets = &groups[0].scopes;
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].scope.map(|s| s.name()), Some("lib-a"));
        assert_eq!(buckets[0].records, vec!["a1", "a2"]);
        assert!(buckets[1].scope.is_none());
        assert_eq!(buckets[1].records, vec!["none1", "none2"]);
        assert_eq!(buckets[2].scope.and_then(|s| s.version()), Some("1.0.0"));
        assert_eq!(buckets[2].records, vec!["b1"]);
    }

    #[test]
    fn empty_input_has_no_groups() {
        let groups = group_by_resource_and_scope::<(), _>(Vec::new());
        assert!(groups.is_empty());
    }

    #[test]
    fn detects_unset_scope() {
        assert!(!scope_is_set(&InstrumentationScope::builder("").build()));
        assert!(scope_is_set(&InstrumentationScope::builder("name").build()));
        assert!(scope_is_set(
            &InstrumentationScope::builder("").with_version("1").build()
        ));
    }
}
