//! Extract features from a synthetic drop-jump window for validation testing

fn main() {
    let samples: Vec<String> = (0..64)
        .map(|i| {
            let az = match i {
                10 => 24.0,
                11..=13 => 12.0,
                _ => 1.0,
            };
            let ay = if i < 32 { 2.4 } else { 1.2 };
            format!(
                r#"{{"ts": {}, "ax": 0.3, "ay": {}, "az": {}, "gx": 0.1, "gy": 0.0, "gz": 0.4}}"#,
                i * 10,
                ay,
                az
            )
        })
        .collect();
    let json = format!(
        r#"{{"windowTs": "2024-01-15T14:00:00Z", "side": "left", "samples": [{}]}}"#,
        samples.join(",")
    );

    match motion_flux::extract_features(&json) {
        Ok(features) => {
            for feature in features {
                match serde_json::to_string(&feature) {
                    Ok(line) => println!("{line}"),
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
        }
        Err(e) => eprintln!("Error: {e}"),
    }
}
