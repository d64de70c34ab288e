//! Built-in per-game server catalogues.
//!
//! Each supported game is data, not a code path: a profile contributes a
//! set of targets and the classifier thresholds tuned for that game. The
//! address tables are the published regional edge IPs the desktop client
//! pings.

use crate::quality::Thresholds;
use crate::registry::{Protocol, Target};

/// A supported game (or the baseline connectivity check).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameProfile {
    LeagueOfLegends,
    Valorant,
    CounterStrike2,
    Fortnite,
    ApexLegends,
    /// Public DNS anchors, used as a neutral baseline when comparing
    /// network paths rather than game regions.
    Connectivity,
}

impl GameProfile {
    /// Group key used on this profile's targets.
    pub fn group(&self) -> &'static str {
        match self {
            GameProfile::LeagueOfLegends => "lol",
            GameProfile::Valorant => "valorant",
            GameProfile::CounterStrike2 => "cs2",
            GameProfile::Fortnite => "fortnite",
            GameProfile::ApexLegends => "apex",
            GameProfile::Connectivity => "connectivity",
        }
    }

    /// The regional endpoints to probe for this game.
    pub fn targets(&self) -> Vec<Target> {
        let icmp = |id: &str, name: &str, addr: &str| {
            Target::new(id, name, self.group(), addr, Protocol::Icmp)
        };
        match self {
            GameProfile::LeagueOfLegends => vec![
                icmp("lol-na", "North America", "104.160.131.1"),
                icmp("lol-euw", "Europe West", "104.160.141.3"),
                icmp("lol-eune", "Europe Nordic & East", "104.160.142.3"),
                icmp("lol-kr", "Korea", "104.160.156.1"),
                icmp("lol-br", "Brazil", "104.160.152.3"),
                icmp("lol-sg", "Singapore", "104.160.136.3"),
            ],
            GameProfile::Valorant => vec![
                icmp("valorant-1", "Valorant Edge 1", "104.18.0.0"),
                icmp("valorant-2", "Valorant Edge 2", "104.18.1.0"),
            ],
            GameProfile::CounterStrike2 => vec![
                icmp("cs2-1", "CS2 Edge 1", "162.254.196.0"),
                icmp("cs2-2", "CS2 Edge 2", "162.254.197.0"),
            ],
            GameProfile::Fortnite => vec![
                icmp("fortnite-1", "Fortnite Edge 1", "3.208.0.0"),
                icmp("fortnite-2", "Fortnite Edge 2", "3.208.1.0"),
            ],
            GameProfile::ApexLegends => vec![
                icmp("apex-1", "Apex Edge 1", "13.107.42.14"),
                icmp("apex-2", "Apex Edge 2", "13.107.42.15"),
            ],
            GameProfile::Connectivity => vec![
                icmp("dns-google", "Google DNS", "8.8.8.8"),
                icmp("dns-cloudflare", "Cloudflare DNS", "1.1.1.1"),
                icmp("dns-opendns", "OpenDNS", "208.67.222.222"),
                icmp("dns-google-2", "Google DNS Secondary", "8.8.4.4"),
            ],
        }
    }

    /// Classifier thresholds for this game.
    ///
    /// Tab-target games tolerate more latency than tick-sensitive
    /// shooters; the baseline connectivity group uses the defaults.
    pub fn thresholds(&self) -> Thresholds {
        match self {
            GameProfile::LeagueOfLegends => Thresholds {
                rtt_ms: [40.0, 70.0, 110.0],
                ..Thresholds::default()
            },
            GameProfile::Valorant | GameProfile::CounterStrike2 => Thresholds {
                rtt_ms: [35.0, 60.0, 90.0],
                jitter_ms: [8.0, 15.0, 30.0],
                ..Thresholds::default()
            },
            GameProfile::Fortnite | GameProfile::ApexLegends => Thresholds {
                rtt_ms: [45.0, 75.0, 115.0],
                ..Thresholds::default()
            },
            GameProfile::Connectivity => Thresholds::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TargetRegistry;
    use std::collections::HashSet;

    const ALL: [GameProfile; 6] = [
        GameProfile::LeagueOfLegends,
        GameProfile::Valorant,
        GameProfile::CounterStrike2,
        GameProfile::Fortnite,
        GameProfile::ApexLegends,
        GameProfile::Connectivity,
    ];

    #[test]
    fn profile_ids_are_unique_across_all_profiles() {
        let mut seen = HashSet::new();
        for profile in ALL {
            for target in profile.targets() {
                assert!(seen.insert(target.id.clone()), "duplicate id {}", target.id);
                assert_eq!(target.group, profile.group());
                assert!(target.address.parse::<std::net::IpAddr>().is_ok());
            }
        }
    }

    #[test]
    fn all_profiles_register_cleanly() {
        let mut reg = TargetRegistry::new();
        for profile in ALL {
            reg.register_all(profile.targets()).unwrap();
        }
        assert_eq!(reg.list_group("lol").count(), 6);
        assert_eq!(reg.list_group("connectivity").count(), 4);
    }
}
