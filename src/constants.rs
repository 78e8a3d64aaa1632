/// Broker name constants to ensure consistency across the codebase
/// These constants define the names used in CLI arguments, API routes and logs

// Broker names (used in CLI and API routes)
pub const ALERCE: &str = "alerce";
pub const ANTARES: &str = "antares";
pub const FINK: &str = "fink";
pub const LASAIR: &str = "lasair";

// Display names (used in human-facing output)
pub const ALERCE_DISPLAY: &str = "ALeRCE";
pub const ANTARES_DISPLAY: &str = "ANTARES";
pub const FINK_DISPLAY: &str = "Fink";
pub const LASAIR_DISPLAY: &str = "Lasair";

/// TNS bulk export of all public objects, served as a zipped CSV.
pub const TNS_PUBLIC_OBJECTS_URL: &str =
    "https://www.wis-tns.org/system/files/tns_public_objects/tns_public_objects.csv.zip";

/// Identity header sent when no TNS bot credentials are configured.
pub const TNS_DEFAULT_USER_AGENT: &str = r#"tns_marker{"type": "user", "name":"metabroker"}"#;

// Default broker API endpoints
pub const ALERCE_API_URL: &str = "https://api.alerce.online/ztf/v1";
pub const ALERCE_CATSHTM_URL: &str = "https://catshtm.alerce.online";
pub const ANTARES_API_URL: &str = "https://api.antares.noirlab.edu/v1";
pub const FINK_API_URL: &str = "https://api.fink-portal.org/api/v1";
pub const LASAIR_API_URL: &str = "https://lasair-ztf.lsst.ac.uk/api";
pub const ATLAS_BASE_URL: &str = "https://fallingstar-data.com/forcedphot";

/// Cone search radius shared by the positional fallback queries, in arcseconds.
pub const CONE_RADIUS_ARCSEC: f64 = 3.0;

/// Get all supported broker names
pub fn get_supported_brokers() -> Vec<&'static str> {
    vec![ALERCE, ANTARES, FINK, LASAIR]
}
