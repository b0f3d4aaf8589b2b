// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bake map definitions read from the `bake.maps.<tag>.*` property group.

use lucerna_core::config::Properties;
use lucerna_core::error::ConfigError;

const DEFAULT_OBJECT_NAME: &str = "objectNameToBake";
const DEFAULT_MAP_SIZE: u32 = 512;

/// The kind of data baked into a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BakeMapType {
    /// Incoming illumination stored in the object's texture space.
    LightMap,
}

impl BakeMapType {
    /// Parses a `bake.maps.<tag>.type` value.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "LIGHTMAP" => Some(BakeMapType::LightMap),
            _ => None,
        }
    }

    /// The property value naming this type.
    pub fn tag(self) -> &'static str {
        match self {
            BakeMapType::LightMap => "LIGHTMAP",
        }
    }
}

/// One map to bake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BakeMapInfo {
    /// The group tag, `<tag>` in `bake.maps.<tag>`.
    pub tag: String,
    /// What the map stores.
    pub map_type: BakeMapType,
    /// Output image file.
    pub file_name: String,
    /// Map width in texels.
    pub width: u32,
    /// Map height in texels.
    pub height: u32,
    /// Objects baked into this map, in declaration order.
    pub object_names: Vec<String>,
}

/// Reads every `bake.maps.<tag>` block, in order of first appearance.
///
/// An absent group is an empty list. An unknown type or a block with an empty
/// tag rejects the whole definition.
pub fn parse_bake_maps(props: &Properties) -> Result<Vec<BakeMapInfo>, ConfigError> {
    let mut maps = Vec::new();
    for prefix in props.unique_sub_names("bake.maps") {
        let tag = Properties::extract_field(&prefix, 2);
        if tag.is_empty() {
            return Err(ConfigError::InvalidGroupKey {
                group: "bake map",
                name: prefix,
            });
        }

        let type_key = format!("{prefix}.type");
        let type_tag = props.get_string(&type_key, BakeMapType::LightMap.tag())?;
        let map_type =
            BakeMapType::from_tag(&type_tag).ok_or_else(|| ConfigError::UnknownValue {
                key: type_key,
                value: type_tag.clone(),
                what: "bake map type",
            })?;

        maps.push(BakeMapInfo {
            tag: tag.to_string(),
            map_type,
            file_name: props.get_string(&format!("{prefix}.filename"), DEFAULT_OBJECT_NAME)?,
            width: props.get_u32(&format!("{prefix}.width"), DEFAULT_MAP_SIZE)?,
            height: props.get_u32(&format!("{prefix}.height"), DEFAULT_MAP_SIZE)?,
            object_names: props.get_strings(&format!("{prefix}.objectnames"), &[DEFAULT_OBJECT_NAME]),
        });
    }

    log::info!("Number of maps to bake: {}", maps.len());
    Ok(maps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_group_is_empty() {
        let props = Properties::new().with("renderengine.type", "BAKECPU");
        assert!(parse_bake_maps(&props).unwrap().is_empty());
    }

    #[test]
    fn test_one_descriptor_per_tag() {
        let props = Properties::new()
            .with("bake.maps.floor.type", "LIGHTMAP")
            .with("bake.maps.floor.filename", "floor.exr")
            .with_values("bake.maps.floor.objectnames", ["Floor", "Wall", "Ceiling"])
            .with("bake.maps.head.width", "1024")
            .with("bake.maps.floor.width", "256");

        let maps = parse_bake_maps(&props).unwrap();

        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].tag, "floor");
        assert_eq!(maps[0].file_name, "floor.exr");
        assert_eq!(maps[0].width, 256);
        assert_eq!(maps[0].height, DEFAULT_MAP_SIZE);
        assert_eq!(maps[0].object_names, vec!["Floor", "Wall", "Ceiling"]);
        assert_eq!(maps[1].tag, "head");
        assert_eq!(maps[1].width, 1024);
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let props = Properties::new().with("bake.maps.lm.height", "64");
        let map = &parse_bake_maps(&props).unwrap()[0];

        assert_eq!(map.map_type, BakeMapType::LightMap);
        assert_eq!(map.file_name, DEFAULT_OBJECT_NAME);
        assert_eq!(map.width, DEFAULT_MAP_SIZE);
        assert_eq!(map.object_names, vec![DEFAULT_OBJECT_NAME]);
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let props = Properties::new()
            .with("bake.maps.a.type", "LIGHTMAP")
            .with("bake.maps.b.type", "AOMAP");
        match parse_bake_maps(&props) {
            Err(ConfigError::UnknownValue { key, value, .. }) => {
                assert_eq!(key, "bake.maps.b.type");
                assert_eq!(value, "AOMAP");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_empty_tag_is_a_syntax_error() {
        let props = Properties::new().with("bake.maps..type", "LIGHTMAP");
        let err = parse_bake_maps(&props).unwrap_err();
        assert!(err.to_string().starts_with("Syntax error in bake map definition"));
    }
}
