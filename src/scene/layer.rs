//! Render layers
//!
//! Every renderable belongs to one or more layers; a camera draws the
//! layers in its mask. Entities without [`RenderLayers`] live on the
//! default layer.

use bevy_ecs::prelude::*;

use crate::error::{RenderError, RenderResult};

pub type LayerId = u8;

/// Set of up to 64 layer ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerMask(pub u64);

impl LayerMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u64::MAX);
    pub const DEFAULT: Self = Self(1);

    /// Mask holding only `id`. Ids past the last layer give an empty mask.
    pub fn layer(id: LayerId) -> Self {
        if id as usize >= Layers::MAX_LAYERS {
            log::warn!(
                "Layer id {} out of range (max {}), ignoring",
                id,
                Layers::MAX_LAYERS - 1
            );
            return Self::NONE;
        }
        Self(1u64 << id)
    }

    pub fn with(self, id: LayerId) -> Self {
        self | Self::layer(id)
    }

    pub fn without(self, id: LayerId) -> Self {
        Self(self.0 & !Self::layer(id).0)
    }

    pub fn contains(&self, id: LayerId) -> bool {
        (id as usize) < Layers::MAX_LAYERS && self.0 & (1u64 << id) != 0
    }

    pub fn intersects(&self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Lowest layer id in the mask
    pub fn first(&self) -> Option<LayerId> {
        (!self.is_empty()).then(|| self.0.trailing_zeros() as LayerId)
    }

    /// Layer ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = LayerId> + '_ {
        let bits = self.0;
        (0..Layers::MAX_LAYERS as u8).filter(move |id| bits & (1u64 << id) != 0)
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::ops::BitOr for LayerMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for LayerMask {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

/// Layers a renderable belongs to
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderLayers(pub LayerMask);

/// Registry of named layers.
///
/// [`RenderSystem::update`](crate::RenderSystem::update) adds one to the
/// world when missing. Masks for cameras and [`RenderLayers`] for
/// renderables are built from names with [`mask`](Self::mask) and
/// [`render_layers`](Self::render_layers).
#[derive(Resource, Debug, Clone)]
pub struct Layers {
    names: Vec<Option<String>>,
}

impl Layers {
    pub const MAX_LAYERS: usize = 64;
    pub const DEFAULT: LayerId = 0;
    pub const DEFAULT_NAME: &'static str = "Default";

    pub fn new() -> Self {
        let mut names = vec![None; Self::MAX_LAYERS];
        names[Self::DEFAULT as usize] = Some(Self::DEFAULT_NAME.to_string());
        Self { names }
    }

    /// Register a new layer under the lowest free id
    pub fn add(&mut self, name: &str) -> RenderResult<LayerId> {
        if self.id(name).is_some() {
            return Err(RenderError::DuplicateLayer(name.to_string()));
        }
        let free = self
            .names
            .iter()
            .position(Option::is_none)
            .ok_or(RenderError::LayerTableFull(Self::MAX_LAYERS))?;
        self.names[free] = Some(name.to_string());
        Ok(free as LayerId)
    }

    /// Remove a named layer. The default layer cannot be removed.
    pub fn remove(&mut self, name: &str) -> Option<LayerId> {
        let id = self.id(name)?;
        if id == Self::DEFAULT {
            log::warn!("The default layer cannot be removed");
            return None;
        }
        self.names[id as usize] = None;
        Some(id)
    }

    pub fn id(&self, name: &str) -> Option<LayerId> {
        self.names
            .iter()
            .position(|n| n.as_deref() == Some(name))
            .map(|id| id as LayerId)
    }

    pub fn name(&self, id: LayerId) -> Option<&str> {
        self.names.get(id as usize)?.as_deref()
    }

    /// Mask of the named layers, ignoring unknown names
    pub fn mask(&self, names: &[&str]) -> LayerMask {
        names
            .iter()
            .filter_map(|name| self.id(name))
            .fold(LayerMask::NONE, LayerMask::with)
    }

    /// Component placing a renderable on the named layers
    pub fn render_layers(&self, names: &[&str]) -> RenderLayers {
        RenderLayers(self.mask(names))
    }

    pub fn len(&self) -> usize {
        self.names.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Layers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layer_exists_and_is_permanent() {
        let mut layers = Layers::new();
        assert_eq!(layers.id("Default"), Some(0));
        assert_eq!(layers.remove("Default"), None);
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn test_add_and_remove_layers() {
        let mut layers = Layers::new();
        let ui = layers.add("UI").unwrap();
        let fx = layers.add("FX").unwrap();
        assert_eq!((ui, fx), (1, 2));
        assert!(matches!(layers.add("UI"), Err(RenderError::DuplicateLayer(_))));

        assert_eq!(layers.remove("UI"), Some(1));
        assert_eq!(layers.add("Water").unwrap(), 1);
        assert_eq!(layers.mask(&["Default", "FX", "Missing"]), LayerMask(0b101));
    }

    #[test]
    fn test_render_layers_from_names() {
        let mut layers = Layers::new();
        let water = layers.add("Water").unwrap();
        let tagged = layers.render_layers(&["Water", "Default"]);
        assert!(tagged.0.contains(water));
        assert!(tagged.0.contains(Layers::DEFAULT));
        assert_eq!(layers.render_layers(&["Nope"]), RenderLayers(LayerMask::NONE));
    }

    #[test]
    fn test_layer_table_full() {
        let mut layers = Layers::new();
        for i in 1..Layers::MAX_LAYERS {
            layers.add(&format!("layer{i}")).unwrap();
        }
        assert!(matches!(
            layers.add("overflow"),
            Err(RenderError::LayerTableFull(64))
        ));
    }

    #[test]
    fn test_mask_iterates_ascending() {
        let mask = LayerMask::layer(5).with(0).with(63);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 5, 63]);
        assert!(mask.contains(63));
        assert!(!mask.without(5).contains(5));
        assert!(!mask.contains(64));
    }

    #[test]
    fn test_out_of_range_layer_is_empty() {
        let mask = LayerMask::layer(64);
        assert_eq!(mask, LayerMask::NONE);
        assert!(!mask.contains(Layers::DEFAULT));
        assert!(!mask.intersects(LayerMask::DEFAULT));
        assert_eq!(LayerMask::DEFAULT.with(200), LayerMask::DEFAULT);
        assert_eq!(LayerMask::layer(63).without(64), LayerMask::layer(63));
    }

    #[test]
    fn test_first_layer() {
        assert_eq!(LayerMask::NONE.first(), None);
        assert_eq!(LayerMask::layer(7).with(40).first(), Some(7));
        assert_eq!(LayerMask::ALL.first(), Some(0));
    }
}
