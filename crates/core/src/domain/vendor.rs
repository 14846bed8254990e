use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VendorId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorCategory {
    Preferred,
    Specialized,
    General,
    Uncategorized,
}

impl VendorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preferred => "preferred",
            Self::Specialized => "specialized",
            Self::General => "general",
            Self::Uncategorized => "uncategorized",
        }
    }

    /// Unknown categories carry no scoring bonus, so they collapse to `Uncategorized`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "preferred" => Self::Preferred,
            "specialized" => Self::Specialized,
            "general" => Self::General,
            _ => Self::Uncategorized,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorStatus {
    Approved,
    Pending,
    Suspended,
}

impl VendorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Pending => "pending",
            Self::Suspended => "suspended",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Self::Approved,
            "suspended" => Self::Suspended,
            _ => Self::Pending,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: VendorId,
    pub name: String,
    pub category: VendorCategory,
    pub status: VendorStatus,
}

#[cfg(test)]
mod tests {
    use super::{VendorCategory, VendorStatus};

    #[test]
    fn category_parsing_is_case_insensitive() {
        assert_eq!(VendorCategory::parse(" Preferred "), VendorCategory::Preferred);
        assert_eq!(VendorCategory::parse("SPECIALIZED"), VendorCategory::Specialized);
        assert_eq!(VendorCategory::parse("boutique"), VendorCategory::Uncategorized);
    }

    #[test]
    fn unknown_vendor_status_is_pending() {
        assert_eq!(VendorStatus::parse("approved"), VendorStatus::Approved);
        assert_eq!(VendorStatus::parse("blacklisted"), VendorStatus::Pending);
    }
}
