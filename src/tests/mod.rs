mod wifi;
