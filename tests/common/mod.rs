//! Shared helpers: builds complete package archives in memory.

use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use printforge::package::concat::stream_checksum;

pub struct PackageBuilder {
    pub printer_model: String,
    pub filament_type: String,
    pub print_profile: String,
    pub printer_settings_id: String,
    pub gcode: String,
}

impl Default for PackageBuilder {
    fn default() -> Self {
        Self {
            printer_model: "Bambu Lab X1 Carbon".to_string(),
            filament_type: "PLA".to_string(),
            print_profile: "0.20mm Standard @BBL X1C".to_string(),
            printer_settings_id: "Bambu Lab X1 Carbon 0.4 nozzle".to_string(),
            gcode: sample_gcode(),
        }
    }
}

pub fn sample_gcode() -> String {
    let mut code = String::from("; total layer number: 10\nG28\nG90\n");
    for i in 0..20 {
        code.push_str(&format!("G1 X{} Y{} F3000\n", i, i * 2));
    }
    code.push_str("M104 S0\n");
    code
}

impl PackageBuilder {
    pub fn build(&self) -> Vec<u8> {
        let model_xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<model unit="millimeter" xml:lang="en-US">
    <metadata name="Application">BambuStudio-01.09.00.70</metadata>
    <metadata name="CreationDate">2024-03-11</metadata>
    <metadata name="DesignerUserId">90210</metadata>
    <resources/>
    <build/>
</model>"#;
        let project_settings = serde_json::json!({
            "printer_settings_id": self.printer_settings_id,
            "printer_model": self.printer_model,
            "default_print_profile": self.print_profile,
            "default_filament_profile": [format!("Generic {}", self.filament_type)],
            "nozzle_diameter": ["0.4"],
        })
        .to_string();
        let slice_info = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<config>
  <plate>
    <metadata key="index" value="1"/>
    <metadata key="filament_type" value="{}"/>
    <metadata key="printer_model_id" value="{}"/>
  </plate>
</config>"#,
            self.filament_type, self.printer_model
        );
        let plate_json = serde_json::json!({
            "plate_index": 1,
            "prediction": 600,
            "weight": 10.0,
            "nozzle_diameter": 0.4,
        })
        .to_string();

        let files: Vec<(&str, Vec<u8>)> = vec![
            (
                "[Content_Types].xml",
                b"<?xml version=\"1.0\"?><Types/>".to_vec(),
            ),
            ("_rels/.rels", b"<?xml version=\"1.0\"?><Relationships/>".to_vec()),
            ("3D/3dmodel.model", model_xml.as_bytes().to_vec()),
            ("Metadata/plate_1.gcode", self.gcode.clone().into_bytes()),
            (
                "Metadata/plate_1.gcode.md5",
                stream_checksum(self.gcode.as_bytes()).into_bytes(),
            ),
            ("Metadata/plate_1.json", plate_json.into_bytes()),
            ("Metadata/slice_info.config", slice_info.into_bytes()),
            ("Metadata/project_settings.config", project_settings.into_bytes()),
            (
                "Metadata/model_settings.config",
                b"<?xml version=\"1.0\"?><config/>".to_vec(),
            ),
            (
                "Metadata/cut_information.xml",
                b"<?xml version=\"1.0\"?><cut_information/>".to_vec(),
            ),
            ("Metadata/plate_1.png", vec![0x89, b'P', b'N', b'G']),
            ("Metadata/plate_1_small.png", vec![0x89, b'P', b'N', b'G']),
        ];

        let mut buffer = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut buffer);
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in files {
            zip.start_file(name, options).unwrap();
            zip.write_all(&bytes).unwrap();
        }
        zip.finish().unwrap();
        buffer.into_inner()
    }
}

pub fn package_with(printer: &str, material: &str) -> Vec<u8> {
    PackageBuilder {
        printer_model: printer.to_string(),
        filament_type: material.to_string(),
        ..Default::default()
    }
    .build()
}
