use crate::{
    Result,
    error::Error,
};
use alloy_json_abi::{
    Event,
    Function,
    JsonAbi,
};

/// The WavePortal interface description, as emitted by the contract build.
pub static PORTAL_ABI_JSON: &str = include_str!("../abi/WavePortal.json");

/// The portal's callable surface, resolved out of the JSON ABI once at
/// startup so later encoding never has to consult the raw schema again.
#[derive(Clone, Debug)]
pub struct PortalSchema {
    pub wave_count: Function,
    pub get_all_waves: Function,
    pub wave: Function,
    pub new_wave: Event,
}

impl PortalSchema {
    pub fn load() -> Result<Self> {
        Self::parse(PORTAL_ABI_JSON)
    }

    pub fn parse(json: &str) -> Result<Self> {
        let abi: JsonAbi =
            serde_json::from_str(json).map_err(|e| Error::Schema(e.to_string()))?;
        Ok(Self {
            wave_count: resolve_function(&abi, "waveCount")?,
            get_all_waves: resolve_function(&abi, "getAllWaves")?,
            wave: resolve_function(&abi, "wave")?,
            new_wave: resolve_event(&abi, "NewWave")?,
        })
    }
}

fn resolve_function(abi: &JsonAbi, name: &str) -> Result<Function> {
    abi.function(name)
        .and_then(|overloads| overloads.first())
        .cloned()
        .ok_or_else(|| Error::Schema(format!("function `{name}` missing from ABI")))
}

fn resolve_event(abi: &JsonAbi, name: &str) -> Result<Event> {
    abi.event(name)
        .and_then(|overloads| overloads.first())
        .cloned()
        .ok_or_else(|| Error::Schema(format!("event `{name}` missing from ABI")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load__resolves_all_portal_entry_points() {
        let schema = PortalSchema::load().unwrap();
        assert_eq!(schema.wave_count.name, "waveCount");
        assert_eq!(schema.get_all_waves.name, "getAllWaves");
        assert_eq!(schema.wave.name, "wave");
        assert_eq!(schema.new_wave.name, "NewWave");
    }

    #[test]
    fn parse__rejects_schema_without_wave_function() {
        let err = PortalSchema::parse("[]").unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }
}
