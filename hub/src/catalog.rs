//! Plugins the hub knows how to manage out of the box

use crate::models::PluginDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub repository: &'static str,
    pub title: &'static str,
    pub summary: &'static str,
}

impl CatalogEntry {
    pub fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor::new(self.name, self.repository)
    }
}

pub const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        name: "vatACARS",
        repository: "vatacars/vatsys-plugin",
        title: "vatSys Plugin",
        summary: "vatACARS integration for vatSys",
    },
    CatalogEntry {
        name: "VatpacPlugin",
        repository: "badvectors/VatpacPlugin",
        title: "Vatpac Plugin",
        summary: "VATPAC controller tools",
    },
    CatalogEntry {
        name: "AirportsPlugin",
        repository: "badvectors/AirportsPlugin",
        title: "Airports Plugin",
        summary: "Airport information windows",
    },
    CatalogEntry {
        name: "DiscordPlugin",
        repository: "badvectors/DiscordPlugin",
        title: "Discord Plugin",
        summary: "Discord rich presence for vatSys",
    },
    CatalogEntry {
        name: "EventsPlugin",
        repository: "badvectors/EventsPlugin",
        title: "Events Plugin",
        summary: "Event bookings and slots",
    },
    CatalogEntry {
        name: "OzStrips",
        repository: "maxrumsey/OzStrips",
        title: "OzStrips",
        summary: "Electronic flight strips",
    },
];

/// Case-insensitive lookup by plugin name
pub fn find(name: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.name.eq_ignore_ascii_case(name))
}
