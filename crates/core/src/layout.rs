//! Layer-to-device assignment for sharded InternVL2-family checkpoints.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::Serialize;

use crate::error::{AdapterError, Result};

/// Components that always live on unit 0 next to the vision encoder.
pub const PINNED_COMPONENTS: [&str; 7] = [
    "vision_model",
    "mlp1",
    "language_model.model.tok_embeddings",
    "language_model.model.embed_tokens",
    "language_model.output",
    "language_model.model.norm",
    "language_model.lm_head",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSize {
    InternVl2_1B,
    InternVl2_2B,
    InternVl2_4B,
    InternVl2_8B,
    InternVl2_26B,
    InternVl2_40B,
    InternVl2Llama3_76B,
    NvlmD72B,
}

impl ModelSize {
    pub const ALL: [ModelSize; 8] = [
        ModelSize::InternVl2_1B,
        ModelSize::InternVl2_2B,
        ModelSize::InternVl2_4B,
        ModelSize::InternVl2_8B,
        ModelSize::InternVl2_26B,
        ModelSize::InternVl2_40B,
        ModelSize::InternVl2Llama3_76B,
        ModelSize::NvlmD72B,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelSize::InternVl2_1B => "InternVL2-1B",
            ModelSize::InternVl2_2B => "InternVL2-2B",
            ModelSize::InternVl2_4B => "InternVL2-4B",
            ModelSize::InternVl2_8B => "InternVL2-8B",
            ModelSize::InternVl2_26B => "InternVL2-26B",
            ModelSize::InternVl2_40B => "InternVL2-40B",
            ModelSize::InternVl2Llama3_76B => "InternVL2-Llama3-76B",
            ModelSize::NvlmD72B => "NVLM-D-72B",
        }
    }

    /// Transformer blocks in the language model.
    pub fn num_blocks(self) -> usize {
        match self {
            ModelSize::InternVl2_1B | ModelSize::InternVl2_2B => 24,
            ModelSize::InternVl2_4B | ModelSize::InternVl2_8B => 32,
            ModelSize::InternVl2_26B => 48,
            ModelSize::InternVl2_40B => 60,
            ModelSize::InternVl2Llama3_76B | ModelSize::NvlmD72B => 80,
        }
    }
}

impl FromStr for ModelSize {
    type Err = AdapterError;

    fn from_str(value: &str) -> Result<Self> {
        // Accept hub ids such as `OpenGVLab/InternVL2-8B`.
        let name = value.rsplit('/').next().unwrap_or(value);
        ModelSize::ALL
            .into_iter()
            .find(|size| size.name() == name)
            .ok_or_else(|| AdapterError::UnknownModelSize(value.to_owned()))
    }
}

impl fmt::Display for ModelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn block_name(index: usize) -> String {
    format!("language_model.model.layers.{index}")
}

/// Component name to compute-unit index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeviceLayoutMap(BTreeMap<String, usize>);

impl DeviceLayoutMap {
    pub fn get(&self, component: &str) -> Option<usize> {
        self.0.get(component).copied()
    }

    pub fn insert(&mut self, component: impl Into<String>, unit: usize) {
        self.0.insert(component.into(), unit);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(name, unit)| (name.as_str(), *unit))
    }

    /// Number of transformer blocks assigned to `unit`.
    pub fn blocks_on(&self, unit: usize) -> usize {
        self.iter()
            .filter(|(name, u)| *u == unit && name.starts_with("language_model.model.layers."))
            .count()
    }
}

/// Blocks per unit; unit 0 counts as half a unit because it also hosts the
/// vision encoder.
pub fn blocks_per_unit(num_blocks: usize, units: usize) -> Result<Vec<usize>> {
    if units == 0 {
        return Err(AdapterError::InvalidDeviceCount(units));
    }
    let per_unit = (num_blocks as f64 / (units as f64 - 0.5)).ceil() as usize;
    let mut counts = vec![per_unit; units];
    counts[0] = (per_unit as f64 * 0.5).ceil() as usize;
    Ok(counts)
}

/// Assign blocks to units in increasing order, unit 0 first.
pub fn distribute_blocks(num_blocks: usize, units: usize) -> Result<DeviceLayoutMap> {
    let counts = blocks_per_unit(num_blocks, units)?;
    let mut map = DeviceLayoutMap::default();
    let mut block = 0;
    for (unit, count) in counts.into_iter().enumerate() {
        for _ in 0..count {
            if block == num_blocks {
                return Ok(map);
            }
            map.insert(block_name(block), unit);
            block += 1;
        }
    }
    Ok(map)
}

/// Override pass: non-block components and the final block go to unit 0.
pub fn pin_components(map: &mut DeviceLayoutMap, num_blocks: usize) {
    for component in PINNED_COMPONENTS {
        map.insert(component, 0);
    }
    if num_blocks > 0 {
        map.insert(block_name(num_blocks - 1), 0);
    }
}

pub fn plan_device_layout(model: &str, units: usize) -> Result<DeviceLayoutMap> {
    let size: ModelSize = model.parse()?;
    let num_blocks = size.num_blocks();
    let mut map = distribute_blocks(num_blocks, units)?;
    pin_components(&mut map, num_blocks);
    Ok(map)
}
