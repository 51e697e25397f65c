use std::collections::HashMap;

use storage::GameType;

/// How a game's history is queried on the remote GraphQL API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameProfile {
    pub game: GameType,
    /// Field carrying the round outcome in the remote payload.
    pub value_field: &'static str,
    /// Operation name prefix, `<outer>History`.
    pub outer_query_name: &'static str,
    /// Root field holding the list of rounds.
    pub query_name: &'static str,
}

impl GameProfile {
    pub fn operation_name(&self) -> String {
        format!("{}History", self.outer_query_name)
    }

    /// Casino page visited to establish the session for this game.
    pub fn page_path(&self) -> String {
        format!("/casino/games/{}", self.game.as_str())
    }

    pub fn graphql_document(&self) -> String {
        format!(
            "query {op}($limit: Int, $offset: Int) {{\n  \
             {query}(limit: $limit, offset: $offset) {{\n    \
             id\n    startTime\n    {value}\n    \
             hash {{ id hash __typename }}\n    __typename\n  }}\n}}",
            op = self.operation_name(),
            query = self.query_name,
            value = self.value_field,
        )
    }
}

/// Lookup table from game type to its query profile.
pub struct GameProfiles {
    profiles: HashMap<GameType, GameProfile>,
}

impl GameProfiles {
    pub fn new() -> Self {
        let mut registry = Self {
            profiles: HashMap::new(),
        };

        registry.register(GameProfile {
            game: GameType::Crash,
            value_field: "crashpoint",
            outer_query_name: "crashGameList",
            query_name: "crashGameList",
        });

        // slide reports its outcome as `multiplier`
        registry.register(GameProfile {
            game: GameType::Slide,
            value_field: "multiplier",
            outer_query_name: "slideList",
            query_name: "slideGameList",
        });

        registry
    }

    fn register(&mut self, profile: GameProfile) {
        self.profiles.insert(profile.game, profile);
    }

    pub fn get(&self, game: GameType) -> Option<&GameProfile> {
        self.profiles.get(&game)
    }
}

impl Default for GameProfiles {
    fn default() -> Self {
        Self::new()
    }
}
