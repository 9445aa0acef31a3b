//! Sampler state deduplication
//!
//! Layers never store filter and wrap settings directly. They hold a
//! [`SamplerEntryId`] from this cache, so two layers asking for the same
//! sampler state share an entry and compare by id.
//!
//! Entries are looked up twice: once on the exact requested key, and once
//! on the key as the driver would see it. Requests that differ only in ways
//! the driver cannot observe share one sampler object.

use hashbrown::HashMap;

/// Texture minification/magnification filter
///
/// Discriminants follow the GL enum values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TextureFilter {
    /// Nearest neighbor (pixelated)
    Nearest = 0x2600,
    /// Linear interpolation (smooth)
    Linear = 0x2601,
    NearestMipmapNearest = 0x2700,
    LinearMipmapNearest = 0x2701,
    NearestMipmapLinear = 0x2702,
    LinearMipmapLinear = 0x2703,
}

impl TextureFilter {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x2600 => Some(TextureFilter::Nearest),
            0x2601 => Some(TextureFilter::Linear),
            0x2700 => Some(TextureFilter::NearestMipmapNearest),
            0x2701 => Some(TextureFilter::LinearMipmapNearest),
            0x2702 => Some(TextureFilter::NearestMipmapLinear),
            0x2703 => Some(TextureFilter::LinearMipmapLinear),
            _ => None,
        }
    }

    /// Whether the filter samples mipmap levels
    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, TextureFilter::Nearest | TextureFilter::Linear)
    }
}

/// Texture coordinate wrap mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum WrapMode {
    Repeat = 0x2901,
    MirroredRepeat = 0x8370,
    ClampToEdge = 0x812F,
    /// Let the renderer pick; clamps unless a primitive asks to repeat
    Automatic = 0x0207,
}

impl WrapMode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x2901 => Some(WrapMode::Repeat),
            0x8370 => Some(WrapMode::MirroredRepeat),
            0x812F => Some(WrapMode::ClampToEdge),
            0x0207 => Some(WrapMode::Automatic),
            _ => None,
        }
    }

    /// The mode the driver is actually given
    fn to_gl(self) -> WrapMode {
        match self {
            WrapMode::Automatic => WrapMode::ClampToEdge,
            other => other,
        }
    }
}

/// Full sampler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerKey {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub wrap_p: WrapMode,
}

impl Default for SamplerKey {
    fn default() -> Self {
        Self {
            min_filter: TextureFilter::Linear,
            mag_filter: TextureFilter::Linear,
            wrap_s: WrapMode::Repeat,
            wrap_t: WrapMode::Repeat,
            wrap_p: WrapMode::Repeat,
        }
    }
}

impl SamplerKey {
    fn canonical(self) -> SamplerKey {
        SamplerKey {
            wrap_s: self.wrap_s.to_gl(),
            wrap_t: self.wrap_t.to_gl(),
            wrap_p: self.wrap_p.to_gl(),
            ..self
        }
    }
}

/// Stable handle to a sampler cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SamplerEntryId(u32);

impl SamplerEntryId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerEntry {
    pub key: SamplerKey,
    /// Driver sampler object shared by every GL-equivalent key
    pub sampler_object: u32,
}

/// Cache of sampler entries
///
/// Entries live as long as the cache. The number of distinct sampler
/// configurations an application uses is small.
pub struct SamplerCache {
    sampler_objects: bool,
    entries: Vec<SamplerEntry>,
    by_key: HashMap<SamplerKey, SamplerEntryId>,
    by_gl_key: HashMap<SamplerKey, u32>,
    next_sampler_object: u32,
}

impl SamplerCache {
    /// `sampler_objects` selects real sampler objects over fake numbering.
    pub fn new(sampler_objects: bool) -> Self {
        Self {
            sampler_objects,
            entries: Vec::new(),
            by_key: HashMap::new(),
            by_gl_key: HashMap::new(),
            next_sampler_object: 1,
        }
    }

    /// Entry for linear filtering with repeat wrapping
    pub fn default_entry(&mut self) -> SamplerEntryId {
        self.get_entry(SamplerKey::default())
    }

    /// Returns the entry for `key`, creating it on first use.
    pub fn get_entry(&mut self, key: SamplerKey) -> SamplerEntryId {
        if let Some(&id) = self.by_key.get(&key) {
            return id;
        }

        let sampler_object = self.gl_sampler_object(key.canonical());
        let id = SamplerEntryId(self.entries.len() as u32);
        self.entries.push(SamplerEntry {
            key,
            sampler_object,
        });
        self.by_key.insert(key, id);

        tracing::debug!(
            "New sampler entry {:?}: {:?} -> object {}",
            id,
            key,
            sampler_object
        );
        id
    }

    /// Entry equal to `entry` with the filters replaced
    pub fn update_filters(
        &mut self,
        entry: SamplerEntryId,
        min_filter: TextureFilter,
        mag_filter: TextureFilter,
    ) -> SamplerEntryId {
        let key = SamplerKey {
            min_filter,
            mag_filter,
            ..self.entry(entry).key
        };
        self.get_entry(key)
    }

    /// Entry equal to `entry` with the wrap modes replaced
    pub fn update_wrap_modes(
        &mut self,
        entry: SamplerEntryId,
        wrap_s: WrapMode,
        wrap_t: WrapMode,
        wrap_p: WrapMode,
    ) -> SamplerEntryId {
        let key = SamplerKey {
            wrap_s,
            wrap_t,
            wrap_p,
            ..self.entry(entry).key
        };
        self.get_entry(key)
    }

    pub fn entry(&self, id: SamplerEntryId) -> &SamplerEntry {
        &self.entries[id.0 as usize]
    }

    pub fn sampler_object(&self, id: SamplerEntryId) -> u32 {
        self.entry(id).sampler_object
    }

    /// Number of distinct requested keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn gl_sampler_object(&mut self, gl_key: SamplerKey) -> u32 {
        if let Some(&object) = self.by_gl_key.get(&gl_key) {
            return object;
        }

        let object = self.next_sampler_object;
        self.next_sampler_object += 1;
        if self.sampler_objects {
            tracing::trace!("Sampler object {} for {:?}", object, gl_key);
        } else {
            tracing::trace!("Fake sampler number {} for {:?}", object, gl_key);
        }
        self.by_gl_key.insert(gl_key, object);
        object
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_entry() {
        let mut cache = SamplerCache::new(true);
        let a = cache.default_entry();
        let b = cache.get_entry(SamplerKey::default());
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_automatic_shares_clamp_object() {
        let mut cache = SamplerCache::new(true);
        let clamp = cache.get_entry(SamplerKey {
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
            wrap_p: WrapMode::ClampToEdge,
            ..SamplerKey::default()
        });
        let automatic = cache.get_entry(SamplerKey {
            wrap_s: WrapMode::Automatic,
            wrap_t: WrapMode::Automatic,
            wrap_p: WrapMode::Automatic,
            ..SamplerKey::default()
        });

        // Distinct entries, one driver object
        assert_ne!(clamp, automatic);
        assert_eq!(cache.sampler_object(clamp), cache.sampler_object(automatic));
    }

    #[test]
    fn test_update_filters() {
        let mut cache = SamplerCache::new(false);
        let base = cache.default_entry();
        let nearest = cache.update_filters(base, TextureFilter::Nearest, TextureFilter::Nearest);
        assert_ne!(base, nearest);
        assert_eq!(cache.entry(nearest).key.wrap_s, WrapMode::Repeat);
        assert_ne!(cache.sampler_object(base), cache.sampler_object(nearest));

        let back = cache.update_filters(nearest, TextureFilter::Linear, TextureFilter::Linear);
        assert_eq!(back, base);
    }

    #[test]
    fn test_update_wrap_modes() {
        let mut cache = SamplerCache::new(true);
        let base = cache.default_entry();
        let mirrored = cache.update_wrap_modes(
            base,
            WrapMode::MirroredRepeat,
            WrapMode::Repeat,
            WrapMode::Repeat,
        );
        let key = cache.entry(mirrored).key;
        assert_eq!(key.wrap_s, WrapMode::MirroredRepeat);
        assert_eq!(key.min_filter, TextureFilter::Linear);
    }

    #[test]
    fn test_from_u32() {
        assert_eq!(TextureFilter::from_u32(0x2703), Some(TextureFilter::LinearMipmapLinear));
        assert!(TextureFilter::LinearMipmapLinear.uses_mipmaps());
        assert_eq!(WrapMode::from_u32(0x812F), Some(WrapMode::ClampToEdge));
        assert_eq!(WrapMode::from_u32(1), None);
    }
}
