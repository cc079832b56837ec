use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use thiserror::Error;

use crate::util::pool::{
    AllocError, ObjectPool, PoolConfig, PoolHandle, PoolHooks, PoolStats, ReleaseError,
};

/// Tint applied to sprites when handed out (white, opaque).
pub const DEFAULT_TINT: u32 = 0xFFFFFFFF;

/// Shared image for all sprites of one vehicle kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl Texture {
    pub fn new(id: u32, name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id,
            name: name.into(),
            width,
            height,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && self.width > 0 && self.height > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("layer '{layer}' is full ({capacity} nodes)")]
    LayerFull { layer: String, capacity: usize },
}

/// Display container sprites are attached into.
#[derive(Debug)]
pub struct SceneLayer {
    name: String,
    z_order: i32,
    capacity: usize,
    nodes: Vec<NodeId>,
}

impl SceneLayer {
    pub fn new(name: impl Into<String>, z_order: i32, capacity: usize) -> Self {
        Self {
            name: name.into(),
            z_order,
            capacity,
            nodes: Vec::new(),
        }
    }

    pub fn attach(&mut self) -> Result<NodeId, SceneError> {
        if self.nodes.len() >= self.capacity {
            return Err(SceneError::LayerFull {
                layer: self.name.clone(),
                capacity: self.capacity,
            });
        }
        let node = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        Ok(node)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn z_order(&self) -> i32 {
        self.z_order
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// A vehicle sprite attached to a scene layer.
#[derive(Debug, Clone)]
pub struct TransportSprite {
    pub node: NodeId,
    pub texture: Rc<Texture>,
    pub position: Vec2,
    /// Heading in radians.
    pub rotation: f32,
    pub alpha: f32,
    /// RGBA packed as u32.
    pub tint: u32,
}

impl TransportSprite {
    pub fn is_visible(&self) -> bool {
        self.alpha > 0.0
    }
}

/// Per-instance data handed to the renderer each frame.
/// Stride = 24 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SpriteInstance {
    pub position: [f32; 2],
    pub rotation: f32,
    pub alpha: f32,
    /// RGBA color packed as u32.
    pub tint: u32,
    pub texture: u32,
}

impl SpriteInstance {
    pub fn from_sprite(sprite: &TransportSprite) -> Self {
        Self {
            position: sprite.position.into(),
            rotation: sprite.rotation,
            alpha: sprite.alpha,
            tint: sprite.tint,
            texture: sprite.texture.id,
        }
    }
}

/// Builds sprites into a layer and flips them between shown and hidden.
pub struct SpriteHooks {
    texture: Rc<Texture>,
    layer: SceneLayer,
}

impl PoolHooks for SpriteHooks {
    type Item = TransportSprite;
    type Error = SceneError;

    fn create(&mut self) -> Result<TransportSprite, SceneError> {
        let node = self.layer.attach()?;
        Ok(TransportSprite {
            node,
            texture: Rc::clone(&self.texture),
            position: Vec2::ZERO,
            rotation: 0.0,
            alpha: 0.0,
            tint: DEFAULT_TINT,
        })
    }

    fn on_allocate(&mut self, sprite: &mut TransportSprite) {
        sprite.alpha = 1.0;
        sprite.tint = DEFAULT_TINT;
    }

    fn on_release(&mut self, sprite: &mut TransportSprite) {
        sprite.alpha = 0.0;
        sprite.rotation = 0.0;
        sprite.position = Vec2::ZERO;
    }
}

/// Pool of vehicle sprites for one texture and layer.
pub struct TransportSpritePool {
    pool: ObjectPool<SpriteHooks>,
}

impl TransportSpritePool {
    /// # Panics
    /// If `texture` is empty.
    pub fn new(texture: Rc<Texture>, layer: SceneLayer, config: PoolConfig) -> Self {
        assert!(
            texture.is_valid(),
            "transport texture '{}' ({}x{}) is not usable",
            texture.name,
            texture.width,
            texture.height
        );
        log::debug!(
            "transport pool '{}' using texture '{}' on layer '{}' (z={})",
            config.name,
            texture.name,
            layer.name(),
            layer.z_order()
        );
        Self {
            pool: ObjectPool::with_config(SpriteHooks { texture, layer }, config),
        }
    }

    pub fn allocate(&mut self) -> Result<PoolHandle, AllocError<SceneError>> {
        self.pool.allocate()
    }

    pub fn release(&mut self, handle: PoolHandle) -> Result<(), ReleaseError> {
        self.pool.release(handle)
    }

    pub fn release_all(&mut self) -> usize {
        self.pool.release_all()
    }

    pub fn get(&self, handle: PoolHandle) -> Option<&TransportSprite> {
        self.pool.get(handle)
    }

    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut TransportSprite> {
        self.pool.get_mut(handle)
    }

    pub fn layer(&self) -> &SceneLayer {
        &self.pool.hooks().layer
    }

    pub fn texture(&self) -> &Texture {
        &self.pool.hooks().texture
    }

    pub fn active_len(&self) -> usize {
        self.pool.active_len()
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Append one instance per sprite currently in use.
    pub fn build_instances(&self, buf: &mut Vec<SpriteInstance>) {
        buf.extend(
            self.pool
                .iter_active()
                .map(|(_, sprite)| SpriteInstance::from_sprite(sprite)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::pool::ReleasePolicy;

    fn truck_pool(layer_capacity: usize, config: PoolConfig) -> TransportSpritePool {
        let texture = Rc::new(Texture::new(3, "truck", 32, 16));
        TransportSpritePool::new(texture, SceneLayer::new("vehicles", 10, layer_capacity), config)
    }

    #[test]
    fn sprites_show_on_allocate_and_hide_on_release() {
        let mut pool = truck_pool(16, PoolConfig::default());
        let a = pool.allocate().unwrap();
        {
            let sprite = pool.get_mut(a).unwrap();
            assert!(sprite.is_visible());
            sprite.position = Vec2::new(40.0, 8.0);
            sprite.rotation = 1.2;
            sprite.tint = 0xFF0000FF;
        }
        pool.release(a).unwrap();
        assert!(pool.get(a).is_none());

        let b = pool.allocate().unwrap();
        assert_eq!(a, b);
        let sprite = pool.get(b).unwrap();
        assert_eq!(sprite.alpha, 1.0);
        assert_eq!(sprite.tint, DEFAULT_TINT);
        assert_eq!(sprite.position, Vec2::ZERO);
        assert_eq!(pool.layer().node_count(), 1);
    }

    #[test]
    fn sprites_share_texture_and_layer() {
        let mut pool = truck_pool(16, PoolConfig::default());
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        let (sa, sb) = (pool.get(a).unwrap(), pool.get(b).unwrap());
        assert!(Rc::ptr_eq(&sa.texture, &sb.texture));
        assert_ne!(sa.node, sb.node);
        assert_eq!(pool.layer().node_count(), 2);
        assert_eq!(pool.texture().name, "truck");
    }

    #[test]
    fn full_layer_surfaces_as_construction_error() {
        let mut pool = truck_pool(1, PoolConfig::default());
        pool.allocate().unwrap();
        match pool.allocate() {
            Err(AllocError::Create(SceneError::LayerFull { capacity, .. })) => {
                assert_eq!(capacity, 1)
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(pool.active_len(), 1);
    }

    #[test]
    fn instance_buffer_holds_only_active_sprites() {
        let config = PoolConfig {
            name: "trucks",
            release_policy: ReleasePolicy::Warn,
            ..PoolConfig::default()
        };
        let mut pool = truck_pool(16, config);
        let handles: Vec<_> = (0..3).map(|_| pool.allocate().unwrap()).collect();
        pool.get_mut(handles[2]).unwrap().position = Vec2::new(5.0, 6.0);
        pool.release(handles[0]).unwrap();

        let mut buf = Vec::new();
        pool.build_instances(&mut buf);
        assert_eq!(buf.len(), 2);
        assert!(buf.iter().all(|inst| inst.alpha == 1.0 && inst.texture == 3));
        assert!(buf.iter().any(|inst| inst.position == [5.0, 6.0]));

        let bytes: &[u8] = bytemuck::cast_slice(&buf);
        assert_eq!(bytes.len(), 2 * std::mem::size_of::<SpriteInstance>());
        assert_eq!(std::mem::size_of::<SpriteInstance>(), 24);
    }

    #[test]
    #[should_panic(expected = "not usable")]
    fn empty_texture_is_rejected() {
        let texture = Rc::new(Texture::new(0, "", 0, 0));
        TransportSpritePool::new(texture, SceneLayer::new("vehicles", 0, 4), PoolConfig::default());
    }
}
