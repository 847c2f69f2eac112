use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

/// Directory the model's CSV output is collected into.
pub const CSV_OUTPUT_DIR: &str = "csvOutput";

/// Fixed header of every recognized simulation parameter name plus the
/// summary metric names, in the order downstream consumers expect.
///
/// Written verbatim as the first line of the output file before any
/// submission happens, so the file's schema is fixed even if the remote
/// model never appends a row.
pub const OUTPUT_COLUMNS: &str = "addRandomLatency,additionalPlaceCompRed,agentContactRateRangeEnd,agentContactRateRangeStart,agentInterviewRecall,\
    baseInfectivity,baseOffCampusExternalInfectionRate,baseOnCampusExternalInfectionRate,cancelSportEvents,closeFitnessCenter,\
    complianceModifier,contactNotifiedNumberOfDaysToIsolate,contactTracingNumberOfDaysTraceback,contactTracingProtocol,csvOutputFilename,\
    daysAfterInfectionToDetect,externalDataCounty,externalDataState,facultyStaffAgentAgeEnd,facultyStaffAgentAgeMean,\
    facultyStaffAgentAgeSD,facultyStaffAgentAgeStart,facultyStaffAgentAttendsPartyEnd,facultyStaffAgentAttendsPartyStart,facultyStaffAgentComplianceIsolateWhenContactNotifiedEnd,\
    facultyStaffAgentComplianceIsolateWhenContactNotifiedStart,facultyStaffAgentCompliancePhysicalDistancingStart,facultyStaffAgentCompliancePhysicalDistancingtEnd,facultyStaffAgentIsolationComplianceEnd,facultyStaffAgentIsolationComplianceStart,\
    facultyStaffAgentMaskComplianceEnd,facultyStaffAgentMaskComplianceStart,facultyStaffAgentProbGoesToOptionalPlaceEnd,facultyStaffAgentProbGoesToOptionalPlaceStart,facultyStaffAgentQuarantineWhenSymptomaticComplianceEnd,\
    facultyStaffAgentQuarantineWhenSymptomaticComplianceStart,facultyStaffAgentReportSymptomsComplianceEnd,facultyStaffAgentReportSymptomsComplianceStart,facultyStaffAgentThrowsPartyEnd,facultyStaffAgentThrowsPartyStart,\
    forceAllAgentsToIsolate,hybridClassesEnabled,includeGradStudents,lastStep,mandateMask,\
    marginalPublicTransitExternalInfectionRate,nActiveAgents,nAgents,numStaffToStudenContacts,numToRandomlyInfect,\
    numToVaccinate,otherIllnessDurationEnd,otherIllnessDurationStart,otherIllnessInfectionRate,outputTransmissions,\
    percAsymptomatic,percHomemadeClothMasks,percInitialInfectedQuarantineOrder,percInitiallyInfected,percInitiallyRecovered,\
    percInitiallyVaccinated,percN95Masks,percOffCampusStudentsWhoUsePublicTransit,percSevere,percSurgicalMasks,\
    placeTypeFlatInfectionRate,runID,showDynamicNetworkAsLinks,studentAgentAgeEnd,studentAgentAgeStart,\
    studentAgentAttendsPartyEnd,studentAgentAttendsPartyStart,studentAgentComplianceIsolateWhenContactNotifiedEnd,studentAgentComplianceIsolateWhenContactNotifiedStart,studentAgentCompliancePhysicalDistancingStart,\
    studentAgentCompliancePhysicalDistancingtEnd,studentAgentIsolationComplianceEnd,studentAgentIsolationComplianceStart,studentAgentMaskComplianceEnd,studentAgentMaskComplianceStart,\
    studentAgentProbGoesToOptionalPlaceEnd,studentAgentProbGoesToOptionalPlaceStart,studentAgentQuarantineWhenSymptomaticComplianceEnd,studentAgentQuarantineWhenSymptomaticComplianceStart,studentAgentReportSymptomsComplianceEnd,\
    studentAgentReportSymptomsComplianceStart,studentAgentThrowsPartyEnd,studentAgentThrowsPartyStart,studentFacingStaffTestMultiplier,suppressAgentType,\
    tOneDay,testDelayTStep,testingAvailableForTracing,testingFalseNegativePerc,testingFalsePositivePerc,\
    testingType,testsPerDay,vaccineEfficacy,cumulativeInfections,peakNumInfected,\
    totDeath,numSusceptible,percPeopleCausing80PercInfections,unknownPlaceInfectionRatioStep,bathroomPlaceInfectionRatioStep,\
    buildingPlaceInfectionRatioStep,campusEventPlaceInfectionRatioStep,discCoursePlaceInfectionRatioStep,nonDiscCoursePlaceInfectionRatioStep,diningHallPlaceInfectionRatioStep,\
    floorPlaceInfectionRatioStep,sportEventPlaceInfectionRatioStep,staffToStudentPlaceInfectionRatioStep,studentGroupPlaceInfectionRatioStep,suitePlaceInfectionRatioStep,\
    fitnessPlaceInfectionRatioStep,officePlaceInfectionRatioStep,unknownPlaceInfectionRatioDay ,bathroomPlaceInfectionRatioDay,buildingPlaceInfectionRatioDay,\
    campusEventPlaceInfectionRatioDay,discCoursePlaceInfectionRatioDay,nonDiscCoursePlaceInfectionRatioDay,diningHallPlaceInfectionRatioDay,floorPlaceInfectionRatioDay,\
    sportEventPlaceInfectionRatioDay,staffToStudentPlaceInfectionRatioDay,studentGroupPlaceInfectionRatioDay,suitePlaceInfectionRatioDay,fitnessPlaceInfectionRatioDay,\
    officePlaceInfectionRatioDay,unknownPlaceInfectionPerc,bathroomPlaceInfectionPerc,buildingPlaceInfectionPerc,campusEventPlaceInfectionPerc,\
    discCoursePlaceInfectionPerc,nonDiscCoursePlaceInfectionPerc,diningHallPlaceInfectionPerc,floorPlaceInfectionPerc,sportEventPlaceInfectionPerc,\
    staffToStudentPlaceInfectionPerc,studentGroupPlaceInfectionPerc,suitePlaceInfectionPerc,fitnessPlaceInfectionPerc,officePlaceInfectionPerc,\
    unknownPlaceTrafficPerc,bathroomPlaceTrafficPerc,buildingPlaceTrafficPerc,campusEventPlaceTrafficPerc,discCoursePlaceTrafficPerc,\
    nonDiscCoursePlaceTrafficPerc,diningHallPlaceTrafficPerc,floorPlaceTrafficPerc,sportEventPlaceTrafficPerc,staffToStudentPlaceTrafficPerc,\
    studentGroupPlaceTrafficPerc,suitePlaceTrafficPerc,fitnessPlaceTrafficPerc,officePlaceTrafficPerc";

/// Creates the output directory and seeds `file_name` with the fixed header.
///
/// Returns the path of the seeded file.
pub fn seed_output_file(dir: &Path, file_name: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating output directory {}", dir.display()))?;
    let path = dir.join(file_name);
    fs::write(&path, format!("{OUTPUT_COLUMNS}\n"))
        .with_context(|| format!("seeding output file {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn seeds_header_before_any_rows() {
        let dir = tempdir().unwrap();
        let path = seed_output_file(&dir.path().join("csvOutput"), "out.csv").unwrap();
        let content = fs::read_to_string(path).unwrap();
        let mut lines = content.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("addRandomLatency,"));
        assert!(header.ends_with(",officePlaceTrafficPerc"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn header_enumerates_core_parameters() {
        let names: Vec<&str> = OUTPUT_COLUMNS.split(',').collect();
        assert_eq!(names.len(), 159);
        assert!(names.contains(&"lastStep"));
        assert!(names.contains(&"csvOutputFilename"));
        assert!(names.contains(&"cumulativeInfections"));
    }
}
