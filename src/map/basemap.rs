/// A named slippy tile source. `{z}`, `{x}`, `{y}` and `{token}` are
/// substituted when a tile is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasemapDefinition {
    pub name: &'static str,
    pub url_template: &'static str,
    pub needs_token: bool,
    pub attribution: &'static str,
}

impl BasemapDefinition {
    /// `None` when the source needs a token and none was supplied.
    pub fn tile_url(&self, zoom: u32, x: u32, y: u32, token: Option<&str>) -> Option<String> {
        let token = match (self.needs_token, token) {
            (true, None) => return None,
            (_, token) => token.unwrap_or_default(),
        };
        Some(
            self.url_template
                .replace("{z}", &zoom.to_string())
                .replace("{x}", &x.to_string())
                .replace("{y}", &y.to_string())
                .replace("{token}", token),
        )
    }
}

pub const OPEN_STREET_MAP: BasemapDefinition = BasemapDefinition {
    name: "OpenStreetMap",
    url_template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
    needs_token: false,
    attribution: "© OpenStreetMap contributors",
};

pub const MAPBOX_SATELLITE: BasemapDefinition = BasemapDefinition {
    name: "Satellite",
    url_template: "https://api.mapbox.com/v4/mapbox.satellite/{z}/{x}/{y}@2x.webp?access_token={token}",
    needs_token: true,
    attribution: "© Mapbox © Maxar",
};

pub const MAPBOX_STREETS: BasemapDefinition = BasemapDefinition {
    name: "Streets",
    url_template: "https://api.mapbox.com/styles/v1/mapbox/streets-v12/tiles/512/{z}/{x}/{y}?access_token={token}",
    needs_token: true,
    attribution: "© Mapbox © OpenStreetMap",
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown basemap {0:?}")]
pub struct UnknownBasemap(pub String);

/// Keeps exactly one basemap attached. Switching detaches the current layer
/// and attaches the new one in the same step, with no transition.
#[derive(Debug, Clone)]
pub struct BasemapSwitcher {
    definitions: Vec<BasemapDefinition>,
    attached: usize,
    generation: u64,
}

impl Default for BasemapSwitcher {
    fn default() -> Self {
        Self::new(vec![OPEN_STREET_MAP, MAPBOX_SATELLITE, MAPBOX_STREETS])
    }
}

impl BasemapSwitcher {
    /// The first definition starts attached.
    pub fn new(definitions: Vec<BasemapDefinition>) -> Self {
        assert!(!definitions.is_empty(), "a basemap switcher needs at least one layer");
        Self {
            definitions,
            attached: 0,
            generation: 0,
        }
    }

    /// Only the definitions usable with the given token availability.
    pub fn available(has_token: bool) -> Self {
        let definitions = [OPEN_STREET_MAP, MAPBOX_SATELLITE, MAPBOX_STREETS]
            .into_iter()
            .filter(|d| has_token || !d.needs_token)
            .collect();
        Self::new(definitions)
    }

    pub fn definitions(&self) -> &[BasemapDefinition] {
        &self.definitions
    }

    pub fn active(&self) -> &BasemapDefinition {
        &self.definitions[self.attached]
    }

    /// Bumped on every switch, so tiles requested for a detached layer can be told apart.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns whether the attached layer changed.
    pub fn select(&mut self, name: &str) -> Result<bool, UnknownBasemap> {
        let index = self
            .definitions
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| UnknownBasemap(name.to_string()))?;
        if index == self.attached {
            return Ok(false);
        }
        log::debug!("Basemap {} -> {}", self.active().name, name);
        self.attached = index;
        self.generation += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switching_twice_keeps_one_layer() {
        let mut switcher = BasemapSwitcher::default();
        assert!(switcher.select("Satellite").unwrap());
        assert_eq!(switcher.active().name, "Satellite");
        assert!(switcher.select("Streets").unwrap());
        assert_eq!(switcher.active().name, "Streets");
        assert_eq!(switcher.generation(), 2);
    }

    #[test]
    fn reselecting_or_unknown_changes_nothing() {
        let mut switcher = BasemapSwitcher::default();
        assert!(!switcher.select("OpenStreetMap").unwrap());
        assert_eq!(
            switcher.select("Terrain"),
            Err(UnknownBasemap("Terrain".to_string()))
        );
        assert_eq!(switcher.active().name, "OpenStreetMap");
        assert_eq!(switcher.generation(), 0);
    }

    #[test]
    fn token_gates_mapbox_layers() {
        assert_eq!(BasemapSwitcher::available(false).definitions().len(), 1);
        assert_eq!(BasemapSwitcher::available(true).definitions().len(), 3);
        assert!(MAPBOX_SATELLITE.tile_url(1, 0, 1, None).is_none());
        assert_eq!(
            MAPBOX_SATELLITE.tile_url(3, 4, 5, Some("pk.abc")).unwrap(),
            "https://api.mapbox.com/v4/mapbox.satellite/3/4/5@2x.webp?access_token=pk.abc"
        );
        assert_eq!(
            OPEN_STREET_MAP.tile_url(2, 1, 0, None).unwrap(),
            "https://tile.openstreetmap.org/2/1/0.png"
        );
    }
}
