/*!

This is the long-form manual for `survey_view` and `surveydash`.

## Input data

The input is one or more Excel workbooks (`.xlsx`) exported from a mobile data
collection platform. Only the first sheet of each workbook is read, and the first
row of that sheet must contain the column names. The order of the columns does
not matter.

The following columns are understood. Any of them may be missing from a file; a
missing column is treated as if all its values were missing.

| Column | Meaning |
|--------|---------|
| `KEY` | the identifier of the submission |
| `review_status` | the review state in the collection platform |
| `SubmissionDate` | when the form was submitted |
| `Geopoint1-Latitude`, `Geopoint1-Longitude` | the main GPS reading |
| `geopoint-Latitude`, `geopoint-Longitude` | a second GPS reading, used when the main one is incomplete |
| `Surveyor_Id`, `Surveyor_Name` | who collected the submission |
| `Province`, `District`, `Village` | where it was collected |
| `external_verification` | `1` if someone other than the respondent confirmed the submission |
| `duration` | the time spent on the form, in seconds |
| `Beneficiary_Name`, `Surveyor_Comments` | free text |
| `Elder_Name`, `Elder_Relationship`, `Elder_Phone`, `Elder_Comments` | the community elder who confirmed the submission |
| `Photo_URL`, `Audio_URL`, `Document_URL` | links to the attachments |

Other columns are kept and shown in the record details.

## Missing and invalid values

* Text columns that are empty are displayed as `Not provided`.
* `SubmissionDate` values that cannot be read are left out of the timeline, but
  the submission is still counted and always passes the date filter.
* Coordinates: the main pair is used when both values are numbers, then the
  second pair under the same condition. Submissions without a usable pair are not
  placed on the map.
* `external_verification` values that are not numbers count as `0`.
* Durations are displayed in whole minutes.

## Sources

* `file`: a single workbook.
* `folder`: a directory containing a workbook with a known name
  (`EFSP_Dashboard_Data.xlsx` unless configured otherwise).
* `glob`: all the workbooks in a directory. Their columns are merged by name.
  Workbooks that cannot be opened are reported and skipped.

## Map modes

* `cluster`: grouped markers with a popup for each submission.
* `sequence`: one numbered marker per submission.
* `route`: the path followed by one surveyor, in the order of the submissions.
  This mode requires a surveyor to be selected.

Red markers are externally verified submissions, green markers the others.

## Notes

Notes are appended to a CSV file with the columns `Surveyor_Name`, `Timestamp`
and `Notes`. The file is created with its header on the first note. Empty notes
are ignored.

*/
