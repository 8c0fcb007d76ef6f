use anyhow::{Result, bail};

use planewatch::geometry::{GeoPoint, SectorPolicy, phrase_text, sector_phrase};

fn checked_point(latitude: f64, longitude: f64) -> Result<GeoPoint> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        bail!("coordinates out of range: ({}, {})", latitude, longitude);
    }
    Ok(GeoPoint::new(latitude, longitude))
}

/// Print distance, bearing and both spoken phrases between two points
pub fn handle_bearing(from: (f64, f64), to: (f64, f64)) -> Result<()> {
    let from = checked_point(from.0, from.1)?;
    let to = checked_point(to.0, to.1)?;

    let distance = from.distance_km(&to);
    let bearing = from.bearing_to(&to);

    println!("from      {}", from);
    println!("to        {}", to);
    println!("distance  {:.3} km", distance);
    println!("bearing   {:.1}°", bearing);
    for policy in [SectorPolicy::Compound, SectorPolicy::Named] {
        println!(
            "{:<9} {}",
            policy.to_string(),
            phrase_text(&sector_phrase(bearing, policy))
        );
    }
    Ok(())
}

/// Print the token sequence spoken for a bearing
pub fn handle_phrase(degrees: f64, policy: SectorPolicy) -> Result<()> {
    if !degrees.is_finite() {
        bail!("bearing must be a finite number of degrees");
    }
    let tokens = sector_phrase(degrees, policy);
    let keys: Vec<&str> = tokens.iter().map(|t| t.clip_key()).collect();
    println!("{}", phrase_text(&tokens));
    println!("clips: {}", keys.join(", "));
    Ok(())
}
