use once_cell::sync::Lazy;
use regex::Regex;
use strsim::jaro_winkler;

use crate::models::slip::SlipLeg;

/// Threshold for fuzzy team-name matching (0.0 - 1.0). OCR mangles team
/// names often enough that exact containment alone misses real picks.
const TEAM_MATCH_THRESHOLD: f64 = 0.85;

/// Team names recognized on slips (partial matches OK).
static KNOWN_TEAMS: &[&str] = &[
    // NBA
    "lakers", "celtics", "warriors", "bulls", "heat", "nets", "knicks", "sixers",
    "bucks", "suns", "mavericks", "mavs", "clippers", "nuggets", "grizzlies",
    "cavaliers", "cavs", "thunder", "pelicans", "timberwolves", "wolves", "kings",
    "hawks", "hornets", "magic", "pacers", "pistons", "raptors", "wizards",
    "spurs", "jazz", "trail blazers", "blazers", "rockets",
    // NFL
    "chiefs", "eagles", "cowboys", "bills", "ravens", "49ers", "niners", "dolphins",
    "lions", "packers", "bengals", "chargers", "seahawks", "steelers", "rams",
    "vikings", "jaguars", "jags", "texans", "colts", "broncos", "raiders", "saints",
    "patriots", "pats", "bears", "falcons", "cardinals", "giants", "jets", "titans",
    "panthers", "browns", "commanders", "buccaneers", "bucs",
    // MLB
    "yankees", "dodgers", "braves", "astros", "mets", "phillies", "padres",
    "mariners", "blue jays", "orioles", "rays", "twins", "guardians", "rangers",
    "red sox", "white sox", "cubs", "brewers", "diamondbacks", "dbacks",
    "reds", "pirates", "royals", "tigers", "athletics", "angels", "rockies",
    "marlins", "nationals",
    // NHL
    "bruins", "avalanche", "oilers", "hurricanes", "devils", "maple leafs",
    "leafs", "lightning", "stars", "wild", "golden knights", "knights", "flames",
    "kraken", "penguins", "pens", "capitals", "caps", "canucks", "islanders",
    "isles", "blackhawks", "blues", "senators", "sens", "sabres", "red wings",
    "wings", "ducks", "coyotes", "predators", "preds", "sharks",
    // Soccer
    "arsenal", "chelsea", "liverpool", "man city", "manchester city", "man united",
    "manchester united", "tottenham", "barcelona", "real madrid", "bayern",
    "psg", "juventus", "inter", "milan", "dortmund", "ajax", "benfica", "porto",
];

// Team name followed by a spread, moneyline, or total, with optional
// trailing American odds (e.g. "Lakers +3 -110", "Chiefs ML", "Celtics o220.5").
static BET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)([A-Za-z][A-Za-z\s.']+?)\s*([+-]?\d+\.?\d*|ML|moneyline|over|under|[ou]\d+\.?\d*)\s*([+-]\d{2,3})?",
    )
    .expect("bet pattern compiles")
});

// Standalone totals (e.g. "Over 220.5", "u45 -105").
static TOTAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(over|under|o|u)\s*(\d+\.?\d*)\s*([+-]\d{2,3})?")
        .expect("total pattern compiles")
});

/// Parse American or decimal odds into a decimal multiplier.
///
/// "1.95" stays 1.95; "+150" becomes 2.5; "-110" becomes ~1.909. Anything
/// unparseable falls back to 1.0 (even money, no effect on the parlay).
pub fn parse_odds(raw: &str) -> f64 {
    let s = raw.trim();

    if s.contains('.') && !s.starts_with('+') && !s.starts_with('-') {
        if let Ok(v) = s.parse::<f64>() {
            return v;
        }
    }

    if let Ok(n) = s.replace('+', "").parse::<i64>() {
        if n > 0 {
            return 1.0 + n as f64 / 100.0;
        }
        if n < 0 {
            return 1.0 + 100.0 / n.unsigned_abs() as f64;
        }
    }

    1.0
}

/// Parse recognized slip lines into legs. Focuses on team names + lines.
pub fn parse_slip_lines(lines: &[&str]) -> Vec<SlipLeg> {
    let mut legs: Vec<SlipLeg> = Vec::new();

    for raw in lines {
        let line = raw.trim();
        if line.len() < 3 {
            continue;
        }

        if let Some(caps) = BET_RE.captures(line) {
            let candidate = caps[1].trim().to_lowercase();
            let line_info = caps[2].trim().to_string();
            let odds = caps.get(3).map(|m| parse_odds(m.as_str())).unwrap_or(1.0);

            if match_team(&candidate).is_some() {
                let pick = format!("{} {}", title_case(&candidate), line_info);
                if !legs
                    .iter()
                    .any(|leg| leg.pick.to_lowercase().contains(&candidate))
                {
                    legs.push(SlipLeg { pick, odds });
                }
                continue;
            }
        }

        if let Some(caps) = TOTAL_RE.captures(line) {
            let ou = match caps[1].to_lowercase().as_str() {
                "o" | "over" => "Over",
                _ => "Under",
            };
            let pick = format!("{} {}", ou, &caps[2]);
            let odds = caps.get(3).map(|m| parse_odds(m.as_str())).unwrap_or(1.0);

            let pick_lower = pick.to_lowercase();
            if !legs
                .iter()
                .any(|leg| leg.pick.to_lowercase().contains(&pick_lower))
            {
                legs.push(SlipLeg { pick, odds });
            }
        }
    }

    legs
}

/// Match an OCR'd name against the known-team table: containment first,
/// then fuzzy fallback for mangled reads.
fn match_team(candidate: &str) -> Option<&'static str> {
    KNOWN_TEAMS
        .iter()
        .copied()
        .find(|team| candidate.contains(team) || team.contains(candidate))
        .or_else(|| {
            KNOWN_TEAMS
                .iter()
                .copied()
                .map(|team| (team, jaro_winkler(candidate, team)))
                .filter(|(_, score)| *score >= TEAM_MATCH_THRESHOLD)
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(team, _)| team)
        })
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
