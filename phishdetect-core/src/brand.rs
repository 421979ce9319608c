// Brand identity: keyword detection and domain matching

use url::Url;

/// Default brand keyword set, in scan order. The first keyword found in a
/// page title wins, so order matters.
pub const DEFAULT_BRAND_KEYWORDS: &[&str] = &[
    "google", "apple", "microsoft", "amazon", "facebook", "meta",
    "instagram", "whatsapp", "twitter", "linkedin", "youtube", "netflix",
    "paypal", "visa", "mastercard", "stripe", "coinbase",
    "sbi", "hdfc", "icici", "axis", "pnb", "kotak", "yesbank",
    "paytm", "phonepe", "gpay", "upi",
    "swiggy", "zomato", "flipkart", "myntra", "meesho",
    "airtel", "jio", "vodafone", "bsnl",
    "ktu", "ugc", "nta", "aicte", "uidai", "aadhaar", "pan", "digilocker",
    "irctc", "makemytrip", "uber", "ola",
];

pub fn default_keywords() -> Vec<String> {
    DEFAULT_BRAND_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

/// Lower-case and trim a brand name; blank names are unknown.
pub fn normalize_brand(raw: &str) -> Option<String> {
    let brand = raw.trim().to_lowercase();
    if brand.is_empty() { None } else { Some(brand) }
}

/// Scan `title` for the first keyword it contains (case-insensitive).
pub fn detect_brand<'a>(title: &str, keywords: &'a [String]) -> Option<&'a str> {
    let title = title.to_lowercase();
    keywords
        .iter()
        .map(String::as_str)
        .filter(|keyword| !keyword.is_empty())
        .find(|keyword| title.contains(&keyword.to_lowercase()))
}

/// Whether the brand name appears in the URL's host.
pub fn domain_matches(brand: &str, url: &Url) -> bool {
    if brand.is_empty() {
        return false;
    }

    url.host_str()
        .map(|host| host.to_lowercase().contains(&brand.to_lowercase()))
        .unwrap_or(false)
}
