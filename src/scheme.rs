//! Registry of resource kinds the manager serves
//!
//! Built once at startup and shared read-only afterwards.

use std::collections::BTreeSet;

use kube::core::GroupVersionKind;
use kube::Resource;

#[derive(Clone, Debug, Default)]
pub struct Scheme {
    kinds: BTreeSet<(String, String, String)>,
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a statically typed resource
    pub fn add<K>(&mut self) -> &mut Self
    where
        K: Resource<DynamicType = ()>,
    {
        self.kinds.insert((
            K::group(&()).into_owned(),
            K::version(&()).into_owned(),
            K::kind(&()).into_owned(),
        ));
        self
    }

    pub fn with<K>(mut self) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        self.add::<K>();
        self
    }

    pub fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        self.kinds
            .contains(&(gvk.group.clone(), gvk.version.clone(), gvk.kind.clone()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = GroupVersionKind> + '_ {
        self.kinds
            .iter()
            .map(|(g, v, k)| GroupVersionKind::gvk(g, v, k))
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
