//! Word lists for generated project names.

pub const ADJECTIVES: &[&str] = &[
    "aged",
    "ambitious",
    "ancient",
    "artistic",
    "autumn",
    "awful",
    "bad",
    "billowing",
    "bitter",
    "black",
    "blue",
    "bold",
    "bright",
    "broad",
    "broken",
    "calm",
    "charming",
    "clever",
    "cold",
    "cool",
    "crimson",
    "curly",
    "damp",
    "dark",
    "dawn",
    "delicate",
    "delightful",
    "divine",
    "dry",
    "empty",
    "falling",
    "fancy",
    "flat",
    "floral",
    "fragrant",
    "friendly",
    "frosty",
    "gentle",
    "good",
    "green",
    "hidden",
    "holy",
    "icy",
    "jolly",
    "joyful",
    "late",
    "lingering",
    "little",
    "lively",
    "long",
    "lucky",
    "misty",
    "morning",
    "muddy",
    "mute",
    "nameless",
    "noisy",
    "odd",
    "old",
    "orange",
    "patient",
    "plain",
    "polished",
    "proud",
    "purple",
    "quiet",
    "rapid",
    "raspy",
    "red",
    "restless",
    "rough",
    "round",
    "royal",
    "shiny",
    "shrill",
    "shy",
    "silent",
    "small",
    "snowy",
    "soft",
    "solitary",
    "sour",
    "sparkling",
    "spring",
    "square",
    "steep",
    "still",
    "summer",
    "super",
    "sweet",
    "throbbing",
    "tight",
    "tiny",
    "twilight",
    "wandering",
    "weathered",
    "white",
    "wild",
    "winter",
    "wispy",
    "withered",
    "yellow",
    "young",
];

pub const NOUNS: &[&str] = &[
    "air",
    "arm",
    "art",
    "band",
    "bank",
    "bar",
    "base",
    "bath",
    "berry",
    "bird",
    "block",
    "boat",
    "bonus",
    "bread",
    "breeze",
    "brook",
    "bush",
    "butterfly",
    "cafe",
    "cake",
    "cell",
    "cherry",
    "cloud",
    "coffee",
    "control",
    "credit",
    "customer",
    "darkness",
    "dawn",
    "desk",
    "device",
    "dew",
    "diamond",
    "direction",
    "disk",
    "dream",
    "dust",
    "ear",
    "egg",
    "father",
    "feather",
    "field",
    "fire",
    "firefly",
    "fish",
    "flight",
    "flower",
    "fog",
    "forest",
    "frog",
    "frost",
    "future",
    "garden",
    "glade",
    "glitter",
    "grass",
    "guest",
    "hair",
    "hall",
    "hand",
    "hat",
    "haze",
    "heart",
    "hill",
    "home",
    "king",
    "lab",
    "ladder",
    "lake",
    "law",
    "leaf",
    "limit",
    "machine",
    "math",
    "meadow",
    "meaning",
    "media",
    "mode",
    "moon",
    "morning",
    "mother",
    "mountain",
    "mouse",
    "mud",
    "music",
    "night",
    "office",
    "oven",
    "paint",
    "paper",
    "pasta",
    "people",
    "percent",
    "person",
    "pine",
    "pizza",
    "poet",
    "poetry",
    "pond",
    "quality",
    "queen",
    "rain",
    "receipt",
    "recipe",
    "resonance",
    "rice",
    "river",
    "salad",
    "scene",
    "sea",
    "shadow",
    "shape",
    "shower",
    "silence",
    "sky",
    "smoke",
    "snow",
    "snowflake",
    "society",
    "song",
    "sound",
    "soup",
    "star",
    "store",
    "strategy",
    "stream",
    "sun",
    "sunset",
    "surf",
    "table",
    "tea",
    "teacher",
    "term",
    "theory",
    "thunder",
    "tooth",
    "town",
    "tree",
    "truth",
    "union",
    "unit",
    "village",
    "violet",
    "voice",
    "water",
    "waterfall",
    "wave",
    "wildflower",
    "wind",
    "wood",
    "world",
];
