//!
//! Table import and result export.
//!
//! Inputs are CSV tables with a header row:
//! * network: `init_node, term_node, capacity, length, free_flow_time, b, power, speed, toll, link_type`
//! * demand: `init_node, term_node, demand`
//! * UE link flows: `origin, destination, link_origin, link_destination, flow`
//! * UE trip times: `init_node, term_node, travelTime, flow`
//!
//! Results are tab separated text, one file for links and one for OD pairs.
//!
use crate::assignment::cost::CostFunction;
use crate::assignment::network::{Link, Network};
use crate::error::{AssignmentError, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct LinkRow {
    init_node: String,
    term_node: String,
    capacity: f64,
    length: f64,
    free_flow_time: f64,
    b: f64,
    power: f64,
    speed: f64,
    toll: f64,
    link_type: String,
}

#[derive(Debug, Deserialize)]
struct DemandRow {
    init_node: String,
    term_node: String,
    demand: f64,
}

#[derive(Debug, Deserialize)]
struct UeLinkFlowRow {
    origin: String,
    destination: String,
    link_origin: String,
    link_destination: String,
    flow: f64,
}

#[derive(Debug, Deserialize)]
struct UeTripRow {
    init_node: String,
    term_node: String,
    #[serde(rename = "travelTime")]
    travel_time: f64,
    flow: f64,
}

/// Input tables of one network
#[derive(Debug, Clone)]
pub struct NetworkFiles {
    pub network: PathBuf,
    pub demand: PathBuf,
    pub ue_link_flows: Option<PathBuf>,
    pub ue_trip_times: Option<PathBuf>,
}

///
/// Node identifiers are compared as text; integral numbers written as floats (`"12.0"`)
/// are normalized to `"12"`.
///
fn node_key(raw: &str) -> String {
    let raw = raw.trim();
    match raw.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        _ => raw.to_string(),
    }
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
}

/// Add every row of a network table as a link. Returns the number of links read.
pub fn read_links<R: Read>(network: &mut Network, reader: R) -> Result<usize> {
    let mut n = 0;
    for row in csv_reader(reader).deserialize() {
        let row: LinkRow = row?;
        let link = Link::new(row.free_flow_time, row.capacity, row.b, row.power)
            .with_geometry(row.length, row.speed)
            .with_toll(row.toll, row.link_type);
        network.add_link(&node_key(&row.init_node), &node_key(&row.term_node), link);
        n += 1;
    }
    Ok(n)
}

///
/// Add every row of a demand table as an OD pair. Rows without demand may name nodes
/// outside the network and are skipped; positive demand needs both nodes.
///
pub fn read_demand<R: Read>(network: &mut Network, reader: R) -> Result<usize> {
    let mut n = 0;
    for row in csv_reader(reader).deserialize() {
        let row: DemandRow = row?;
        let (origin, destination) = (node_key(&row.init_node), node_key(&row.term_node));
        if row.demand <= 0.0
            && (network.node_index(&origin).is_none() || network.node_index(&destination).is_none())
        {
            debug!("skipping empty OD {} -> {} outside the network", origin, destination);
            continue;
        }
        network.add_trip(&origin, &destination, row.demand)?;
        n += 1;
    }
    Ok(n)
}

///
/// Read the per-OD link flows of a UE solution into the network's baseline.
/// Flows of OD pairs without demand rows still count toward the link totals.
///
/// Rows only name the end nodes of a link; if several parallel links join them,
/// the flow goes to the one listed first in the network table.
///
pub fn read_ue_link_flows<R: Read>(network: &mut Network, reader: R) -> Result<usize> {
    let mut n = 0;
    for row in csv_reader(reader).deserialize() {
        let row: UeLinkFlowRow = row?;
        let (init, term) = (node_key(&row.link_origin), node_key(&row.link_destination));
        let links = network.find_links(&init, &term);
        let e = match links.first() {
            Some(&e) => e,
            None => return Err(AssignmentError::UnknownLink { init, term }),
        };
        if links.len() > 1 {
            warn!(
                "UE flow {} on {} -> {} is ambiguous between {} parallel links, assigned to the first",
                row.flow,
                init,
                term,
                links.len()
            );
        }
        let od = network.find_trip(&node_key(&row.origin), &node_key(&row.destination));
        network.add_ue_flow(e, od, row.flow);
        n += 1;
    }
    Ok(n)
}

///
/// Read UE travel times per OD pair; the bound of each OD pair is `travelTime x flow`.
///
pub fn read_ue_trip_times<R: Read>(network: &mut Network, reader: R) -> Result<usize> {
    let mut n = 0;
    for row in csv_reader(reader).deserialize() {
        let row: UeTripRow = row?;
        let (origin, destination) = (node_key(&row.init_node), node_key(&row.term_node));
        match network.find_trip(&origin, &destination) {
            Some(od) => {
                network.set_ue_bound(od, row.travel_time * row.flow);
                n += 1;
            }
            None => debug!("no demand for UE trip {} -> {}, ignored", origin, destination),
        }
    }
    Ok(n)
}

///
/// Build a network from its tables. Baseline tables are read after the demand,
/// so per-OD baseline flows can be matched to OD pairs.
///
pub fn load_network(files: &NetworkFiles) -> Result<Network> {
    let mut network = Network::new();
    let n_links = read_links(&mut network, File::open(&files.network)?)?;
    let n_trips = read_demand(&mut network, File::open(&files.demand)?)?;
    info!(
        "read {} links between {} nodes, {} OD pairs in {} zones",
        n_links,
        network.node_count(),
        n_trips,
        network.zones().len()
    );

    if let Some(path) = &files.ue_link_flows {
        let n = read_ue_link_flows(&mut network, File::open(path)?)?;
        info!("read {} UE link flows", n);
    }
    if let Some(path) = &files.ue_trip_times {
        let n = read_ue_trip_times(&mut network, File::open(path)?)?;
        info!("read {} UE trip times", n);
    }
    Ok(network)
}

//
// results
//

///
/// Link table: header with total travel time, cost function and mode, then
/// `init_node term_node flow travelTime` per link (travel time at max capacity).
///
pub fn write_link_results<W: Write>(
    network: &Network,
    cost_function: CostFunction,
    system_optimal: bool,
    mut writer: W,
) -> Result<()> {
    writeln!(writer, "Total Travel Time:\t{}", network.real_tstt(cost_function))?;
    writeln!(writer, "Cost function used:\t{}", cost_function)?;
    writeln!(
        writer,
        "User equilibrium (UE) or system optimal (SO):\t{}",
        if system_optimal { "SO" } else { "UE" }
    )?;
    writeln!(writer)?;
    writeln!(writer, "init_node\tterm_node\tflow\ttravelTime")?;
    for (e, link) in network.links() {
        let (v, w) = network.endpoints(e);
        let time = cost_function.link_time_at_max_capacity(link, link.flow);
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            network.node_id(v),
            network.node_id(w),
            link.flow,
            time
        )?;
    }
    Ok(())
}

///
/// OD table: every OD pair with its demand, followed by the links it uses and their times.
///
pub fn write_od_results<W: Write>(
    network: &Network,
    cost_function: CostFunction,
    mut writer: W,
) -> Result<()> {
    writeln!(writer, "OD PAIRS")?;
    writeln!(writer, "init_node\tterm_node\tdemand")?;
    writeln!(writer, "init_node\tterm_node\tflow\ttravelTimeOnLink")?;
    for (od, trip) in network.trips().iter().enumerate() {
        writeln!(
            writer,
            "{}\t{}\t{}",
            network.node_id(trip.origin),
            network.node_id(trip.destination),
            trip.demand
        )?;
        for (e, link) in network.links() {
            let flow = network.od_flow().get(e, od);
            if flow == 0.0 {
                continue;
            }
            let (v, w) = network.endpoints(e);
            let time = cost_function.link_time_at_max_capacity(link, link.flow);
            writeln!(
                writer,
                "{}\t{}\t{}\t{}",
                network.node_id(v),
                network.node_id(w),
                flow,
                time
            )?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// `dir/name.ext` -> `dir/name_OD_pairs.ext`
pub fn od_results_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_OD_pairs.{}", stem, ext.to_string_lossy()),
        None => format!("{}_OD_pairs", stem),
    };
    path.with_file_name(name)
}

///
/// Write the link table to `path` and the OD table next to it. Returns the OD table path.
///
pub fn write_results(
    network: &Network,
    cost_function: CostFunction,
    system_optimal: bool,
    path: &Path,
) -> Result<PathBuf> {
    let mut links = BufWriter::new(File::create(path)?);
    write_link_results(network, cost_function, system_optimal, &mut links)?;
    links.flush()?;

    let od_path = od_results_path(path);
    let mut ods = BufWriter::new(File::create(&od_path)?);
    write_od_results(network, cost_function, &mut ods)?;
    ods.flush()?;
    Ok(od_path)
}
