use std::collections::BTreeSet;

use log::debug;

use super::{Arena, Result, TableErr, View};
use crate::variables::{Tensor, VarStore};

pub const GRAD_SUFFIX: &str = "@GRAD";
pub const MOMENT1_SUFFIX: &str = "_moment1_0";
pub const MOMENT2_SUFFIX: &str = "_moment2_0";

/// The update policy of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Updated by the momentum based optimizer, owns two moment buffers.
    Optimizable,
    /// Running statistics, updated by exponential decay accumulation.
    Accumulated,
}

/// Where a single named parameter lives inside the flat buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutEntry {
    name: String,
    dims: Vec<usize>,
    view: View,
    kind: ParamKind,
}

impl LayoutEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    /// The name of this parameter's gradient.
    pub fn grad_name(&self) -> String {
        format!("{}{GRAD_SUFFIX}", self.name)
    }

    /// The names of both moment buffers, only optimizable parameters have them.
    pub fn moment_names(&self) -> Option<(String, String)> {
        match self.kind {
            ParamKind::Optimizable => Some((
                format!("{}{MOMENT1_SUFFIX}", self.name),
                format!("{}{MOMENT2_SUFFIX}", self.name),
            )),
            ParamKind::Accumulated => None,
        }
    }
}

/// The parameters picked for asynchronous updates, sorted and deduplicated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    optimizable: BTreeSet<String>,
    accumulated: BTreeSet<String>,
}

impl Selection {
    /// Picks every parameter that has a gradient and follows one of the naming conventions.
    ///
    /// # Arguments
    /// * `param_names` - The candidate parameter names.
    /// * `grad_names` - The gradients produced by the workers.
    ///
    /// # Returns
    /// A new `Selection` instance.
    pub fn select<'a, I>(param_names: I, grad_names: &BTreeSet<String>) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut selection = Self::default();

        for name in param_names {
            if !grad_names.contains(&format!("{name}{GRAD_SUFFIX}")) {
                continue;
            }

            if is_optimizable(name) {
                debug!("selected optimizable parameter {name}");
                selection.optimizable.insert(name.clone());
            } else if is_accumulated(name) {
                debug!("selected accumulated parameter {name}");
                selection.accumulated.insert(name.clone());
            }
        }

        selection
    }

    pub fn is_empty(&self) -> bool {
        self.optimizable.is_empty() && self.accumulated.is_empty()
    }

    /// Every selected parameter name together with its gradient name.
    pub fn synced_names(&self) -> BTreeSet<String> {
        self.optimizable
            .iter()
            .chain(&self.accumulated)
            .flat_map(|name| [name.clone(), format!("{name}{GRAD_SUFFIX}")])
            .collect()
    }
}

fn is_optimizable(name: &str) -> bool {
    name.contains("param") && !name.contains("pow_acc")
}

fn is_accumulated(name: &str) -> bool {
    name.contains("summary") && name.contains("batch_s")
}

/// The fixed arrangement of every selected parameter inside the flat buffers.
///
/// Optimizable parameters come first and span `[0, adam_len)`, accumulated
/// parameters follow up to `total_len`. The moment buffers share the offsets of
/// their parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterLayout {
    entries: Vec<LayoutEntry>,
    adam_len: usize,
    total_len: usize,
}

impl ParameterLayout {
    /// Builds the layout of `selection` reading the shapes from `store`.
    ///
    /// # Arguments
    /// * `store` - The source of truth of the variables.
    /// * `selection` - The parameters to lay out.
    ///
    /// # Returns
    /// A new `ParameterLayout` or an error if a variable is missing or a moment
    /// buffer doesn't match its parameter.
    pub fn build<S: VarStore + ?Sized>(store: &S, selection: &Selection) -> Result<Self> {
        if selection.is_empty() {
            return Err(TableErr::NoEligibleParameters);
        }

        let mut entries = Vec::new();
        let mut offset = 0;

        for name in &selection.optimizable {
            let tensor = find(store, name)?;
            let len = tensor.numel();

            for moment in [MOMENT1_SUFFIX, MOMENT2_SUFFIX] {
                let moment = format!("{name}{moment}");
                let got = find(store, &moment)?.numel();

                if got != len {
                    return Err(TableErr::ShapeMismatch {
                        name: moment,
                        got,
                        expected: len,
                    });
                }
            }

            entries.push(LayoutEntry {
                name: name.clone(),
                dims: tensor.dims().to_vec(),
                view: View::new(offset, len),
                kind: ParamKind::Optimizable,
            });
            offset += len;
        }

        let adam_len = offset;

        for name in &selection.accumulated {
            let tensor = find(store, name)?;
            let len = tensor.numel();

            entries.push(LayoutEntry {
                name: name.clone(),
                dims: tensor.dims().to_vec(),
                view: View::new(offset, len),
                kind: ParamKind::Accumulated,
            });
            offset += len;
        }

        Ok(Self {
            entries,
            adam_len,
            total_len: offset,
        })
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn adam_len(&self) -> usize {
        self.adam_len
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Looks up the entry of a parameter by name.
    pub fn find(&self, name: &str) -> Option<&LayoutEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Copies the values of every laid out variable from `store` into the arenas.
    ///
    /// # Arguments
    /// * `store` - The source of truth of the variables.
    /// * `params` - The arena of `total_len` parameters.
    /// * `moment1`, `moment2` - The arenas of `adam_len` moments.
    pub fn load<S: VarStore + ?Sized>(
        &self,
        store: &S,
        params: &mut Arena,
        moment1: &mut Arena,
        moment2: &mut Arena,
    ) -> Result<()> {
        for entry in &self.entries {
            debug!("copying {} into offset {}", entry.name, entry.view.offset());
            params
                .view_mut(entry.view)
                .copy_from_slice(find(store, &entry.name)?.data());

            if let Some((m1, m2)) = entry.moment_names() {
                moment1
                    .view_mut(entry.view)
                    .copy_from_slice(find(store, &m1)?.data());
                moment2
                    .view_mut(entry.view)
                    .copy_from_slice(find(store, &m2)?.data());
            }
        }

        Ok(())
    }

    /// Writes the values held by the arenas back into `store`.
    ///
    /// # Arguments
    /// * `store` - The source of truth of the variables.
    /// * `params` - The arena of `total_len` parameters.
    /// * `moment1`, `moment2` - The arenas of `adam_len` moments.
    pub fn store<S: VarStore + ?Sized>(
        &self,
        store: &mut S,
        params: &Arena,
        moment1: &Arena,
        moment2: &Arena,
    ) {
        for entry in &self.entries {
            debug!("copying back {}", entry.name);
            store
                .get_mut(&entry.name)
                .assign(&entry.dims, params.view(entry.view));

            if let Some((m1, m2)) = entry.moment_names() {
                store.get_mut(&m1).assign(&entry.dims, moment1.view(entry.view));
                store.get_mut(&m2).assign(&entry.dims, moment2.view(entry.view));
            }
        }
    }
}

fn find<'a, S: VarStore + ?Sized>(store: &'a S, name: &str) -> Result<&'a Tensor> {
    store.find(name).ok_or_else(|| TableErr::MissingVariable {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::Scope;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn grads(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| format!("{name}{GRAD_SUFFIX}")).collect()
    }

    fn insert_optimizable(scope: &mut Scope, name: &str, len: usize) {
        scope.insert(name, Tensor::filled(vec![len], 1.));
        scope.insert(format!("{name}{MOMENT1_SUFFIX}"), Tensor::filled(vec![len], 2.));
        scope.insert(format!("{name}{MOMENT2_SUFFIX}"), Tensor::filled(vec![len], 3.));
    }

    #[test]
    fn selection_follows_naming_conventions() {
        let params = names(&[
            "fc_1.w_0_param",
            "fc_0.w_0_param",
            "fc_0.w_0_param_beta1_pow_acc_0",
            "bn0.summary.batch_sum",
            "bn0.summary.other",
            "no_grad_param",
            "unrelated",
        ]);
        let grad_names = grads(&[
            "fc_1.w_0_param",
            "fc_0.w_0_param",
            "fc_0.w_0_param_beta1_pow_acc_0",
            "bn0.summary.batch_sum",
            "bn0.summary.other",
            "unrelated",
        ]);

        let selection = Selection::select(&params, &grad_names);

        assert_eq!(
            selection.optimizable.iter().collect::<Vec<_>>(),
            ["fc_0.w_0_param", "fc_1.w_0_param"]
        );
        assert_eq!(
            selection.accumulated.iter().collect::<Vec<_>>(),
            ["bn0.summary.batch_sum"]
        );

        let synced = selection.synced_names();
        assert!(synced.contains("fc_0.w_0_param@GRAD"));
        assert!(synced.contains("bn0.summary.batch_sum"));
        assert_eq!(synced.len(), 6);
    }

    #[test]
    fn layout_places_optimizable_first() {
        let mut scope = Scope::new();
        insert_optimizable(&mut scope, "b_param", 3);
        insert_optimizable(&mut scope, "a_param", 2);
        scope.insert("x.summary.batch_size", Tensor::filled(vec![4], 5.));

        let params = names(&["x.summary.batch_size", "b_param", "a_param"]);
        let grad_names = grads(&["x.summary.batch_size", "b_param", "a_param"]);
        let selection = Selection::select(&params, &grad_names);
        let layout = ParameterLayout::build(&scope, &selection).unwrap();

        assert_eq!(layout.adam_len(), 5);
        assert_eq!(layout.total_len(), 9);

        let order: Vec<_> = layout.entries().iter().map(|e| e.name()).collect();
        assert_eq!(order, ["a_param", "b_param", "x.summary.batch_size"]);
        assert_eq!(layout.find("b_param").unwrap().view(), View::new(2, 3));
        assert_eq!(
            layout.find("x.summary.batch_size").unwrap().kind(),
            ParamKind::Accumulated
        );
    }

    #[test]
    fn layout_round_trips_through_arenas() {
        let mut scope = Scope::new();
        insert_optimizable(&mut scope, "w_param", 2);
        scope.insert("s.summary.batch_sum", Tensor::new(vec![1], vec![7.]));

        let params = names(&["w_param", "s.summary.batch_sum"]);
        let selection = Selection::select(&params, &grads(&["w_param", "s.summary.batch_sum"]));
        let layout = ParameterLayout::build(&scope, &selection).unwrap();

        let mut p = Arena::zeroed(layout.total_len());
        let mut m1 = Arena::zeroed(layout.adam_len());
        let mut m2 = Arena::zeroed(layout.adam_len());
        layout.load(&scope, &mut p, &mut m1, &mut m2).unwrap();

        assert_eq!(p.as_slice(), [1., 1., 7.]);
        assert_eq!(m1.as_slice(), [2., 2.]);
        assert_eq!(m2.as_slice(), [3., 3.]);

        p.as_mut_slice().fill(9.);
        layout.store(&mut scope, &p, &m1, &m2);
        assert_eq!(scope.find("w_param").unwrap().data(), [9., 9.]);
        assert_eq!(scope.find("s.summary.batch_sum").unwrap().data(), [9.]);
    }

    #[test]
    fn mismatched_moment_is_rejected() {
        let mut scope = Scope::new();
        insert_optimizable(&mut scope, "w_param", 2);
        scope.insert(format!("w_param{MOMENT2_SUFFIX}"), Tensor::filled(vec![3], 0.));

        let params = names(&["w_param"]);
        let selection = Selection::select(&params, &grads(&["w_param"]));
        let err = ParameterLayout::build(&scope, &selection).unwrap_err();

        assert_eq!(
            err,
            TableErr::ShapeMismatch {
                name: format!("w_param{MOMENT2_SUFFIX}"),
                got: 3,
                expected: 2,
            }
        );
    }

    #[test]
    fn empty_selection_is_rejected() {
        let scope = Scope::new();
        let selection = Selection::select(&names(&["unrelated"]), &grads(&["unrelated"]));

        let err = ParameterLayout::build(&scope, &selection).unwrap_err();
        assert_eq!(err, TableErr::NoEligibleParameters);
    }
}
