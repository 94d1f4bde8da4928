use crate::config::Defaults;
use crate::error::{MappingError, Result};
use crate::params::{CreateParams, Filters, NodeKind, NodeParams};
use crate::path::NodePath;
use crate::value::{Atom, ByteOrder, Description, Value};

/// An immutable template binding a logical name to a node path, kind and creation parameters.
///
/// One descriptor is typically shared (through an `Arc`) by every instance
/// of a container type; each instance wraps it in its own
/// [`Binding`](crate::Binding).
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    name: String,
    path: NodePath,
    parent: NodePath,
    kind: NodeKind,
    overwrite: bool,
    params: NodeParams,
}

impl Descriptor {
    pub fn builder(kind: NodeKind, name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            kind,
            name: name.into(),
            target: Target::Parent(NodePath::root().as_str().to_string()),
            overwrite: false,
            params: CreateParams::default(),
        }
    }

    /// The logical field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path of the target node.
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// The group holding the target node.
    pub fn parent(&self) -> &NodePath {
        &self.parent
    }

    /// Leaf name of the target node.
    pub fn leaf(&self) -> &str {
        self.path.name()
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// Creation parameters, already restricted to what the kind forwards.
    pub fn params(&self) -> &NodeParams {
        &self.params
    }
}

#[derive(Debug, Clone)]
enum Target {
    /// Group path; the node is created as `parent/name`.
    Parent(String),
    /// Full node path; the name is only a label.
    Path(String),
}

/// Builder returned by [`Descriptor::builder`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    kind: NodeKind,
    name: String,
    target: Target,
    overwrite: bool,
    params: CreateParams,
}

impl DescriptorBuilder {
    /// Places the node under `group`, named after the descriptor.
    pub fn parent(mut self, group: impl Into<String>) -> Self {
        self.target = Target::Parent(group.into());
        self
    }

    /// Places the node at an explicit full path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.target = Target::Path(path.into());
        self
    }

    /// Remove and recreate an existing node on first write.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn description(mut self, description: Description) -> Self {
        self.params.description = Some(description);
        self
    }

    pub fn atom(mut self, atom: Atom) -> Self {
        self.params.atom = Some(atom);
        self
    }

    pub fn shape(mut self, shape: &[usize]) -> Self {
        self.params.shape = Some(shape.to_vec());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.params.title = Some(title.into());
        self
    }

    pub fn byteorder(mut self, byteorder: ByteOrder) -> Self {
        self.params.byteorder = Some(byteorder);
        self
    }

    pub fn expected_rows(mut self, expected_rows: u64) -> Self {
        self.params.expected_rows = Some(expected_rows);
        self
    }

    pub fn chunkshape(mut self, chunkshape: &[usize]) -> Self {
        self.params.chunkshape = Some(chunkshape.to_vec());
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.params.filters = Some(filters);
        self
    }

    pub fn track_times(mut self, track_times: bool) -> Self {
        self.params.track_times = Some(track_times);
        self
    }

    /// Initial contents written when the node is created.
    pub fn obj(mut self, obj: impl Into<Value>) -> Self {
        self.params.obj = Some(obj.into());
        self
    }

    /// Replaces all per-instance overrides at once.
    pub fn params(mut self, params: CreateParams) -> Self {
        self.params = params;
        self
    }

    pub fn build(self) -> Result<Descriptor> {
        self.build_with(&Defaults::default())
    }

    /// Builds the descriptor, filling unset parameters from `defaults`.
    pub fn build_with(self, defaults: &Defaults) -> Result<Descriptor> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(MappingError::configuration(format!(
                "invalid mapping name {:?}",
                self.name
            )));
        }
        let path = match &self.target {
            Target::Parent(group) => NodePath::parse(group)?.join(&self.name)?,
            Target::Path(full) => NodePath::parse(full)?,
        };
        let parent = path.parent().ok_or_else(|| {
            MappingError::configuration(format!(
                "mapping {} targets the root group, which has no leaf name",
                self.name
            ))
        })?;
        let params = self.params.resolve(self.kind, defaults)?;

        Ok(Descriptor {
            name: self.name,
            path,
            parent,
            kind: self.kind,
            overwrite: self.overwrite,
            params,
        })
    }
}
